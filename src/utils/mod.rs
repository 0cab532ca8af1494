// utils/mod.rs
pub mod config;
pub mod dates;
pub mod normalize;
pub mod ocr;
pub mod security;

// Ré-exports pour faciliter l'import
pub use config::{Config, StorageBackend};
pub use dates::{format_date, format_value, parse_date_str};
pub use normalize::{format_name, normalize_text};
pub use ocr::{
    decode_data_url, extract_nni, is_valid_nni, HttpTextRecognizer, IdentityCardScanner, OcrError,
    TextRecognizer,
};
pub use security::{
    generate_access_token, hash_password, verification_code, verify_access_token,
    verify_password,
};
