// utils/normalize.rs
//! Normalisation des saisies libres (professions, lieux, domiciles) et des noms propres.
//!
//! La transformation est appliquée mot à mot : les séparateurs (espaces,
//! ponctuation, tirets, apostrophes) sont conservés tels quels, les mots
//! entièrement en majuscules ne sont jamais modifiés, et seuls les mots
//! présents dans le vocabulaire administratif sont réécrits.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Vocabulaire administratif connu, sous sa forme canonique.
///
/// La clé de recherche est dérivée de la forme canonique (minuscules, sans
/// accents), ce qui garantit que la forme canonique se retrouve elle-même.
const VOCABULAIRE: &[&str] = &[
    // Professions
    "Élève", "Étudiant", "Étudiante", "Enseignant", "Enseignante", "Professeur",
    "Commerçant", "Commerçante", "Médecin", "Infirmier", "Infirmière",
    "Ingénieur", "Fonctionnaire", "Chauffeur", "Agriculteur", "Cultivateur",
    "Éleveur", "Pêcheur", "Ménagère", "Retraité", "Retraitée", "Militaire",
    "Policier", "Gendarme", "Comptable", "Secrétaire", "Menuisier", "Maçon",
    "Mécanicien", "Électricien", "Couturière", "Couturier", "Avocat",
    "Pharmacien", "Pharmacienne", "Journaliste", "Imam", "Marabout",
    "Forgeron", "Boulanger", "Tailleur", "Vendeur", "Vendeuse", "Sans",
    "Emploi", "Journalier", "Ouvrier", "Cadre", "Technicien",
    // Lieux
    "Nouakchott", "Nouadhibou", "Rosso", "Kaédi", "Kiffa", "Atar", "Zouérate",
    "Tidjikja", "Aleg", "Sélibaby", "Néma", "Akjoujt", "Boutilimit", "Aïoun",
    "Tevragh", "Zeina", "Ksar", "Arafat", "Naïm", "Sebkha", "Riyadh",
    "Toujounine", "Teyarett", "Mina", "Boghé", "Guérou", "Kankossa",
    // Vocabulaire administratif
    "Quartier", "Commune", "Wilaya", "Moughataa", "Îlot", "Hôpital",
    "Clinique", "Maternité", "Centre", "Santé", "Domicile", "Cité", "Rue",
    "Avenue", "Village", "Préfecture", "Arrondissement",
];

fn vocabulaire() -> &'static HashMap<String, &'static str> {
    static TABLE: OnceLock<HashMap<String, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        VOCABULAIRE
            .iter()
            .map(|canonique| (lookup_key(canonique), *canonique))
            .collect()
    })
}

/// Remplace les lettres accentuées latines par leur lettre de base.
fn strip_accents(c: char) -> char {
    match c {
        'à' | 'â' | 'ä' | 'á' | 'ã' => 'a',
        'ç' => 'c',
        'é' | 'è' | 'ê' | 'ë' => 'e',
        'î' | 'ï' | 'í' | 'ì' => 'i',
        'ô' | 'ö' | 'ó' | 'ò' | 'õ' => 'o',
        'ù' | 'û' | 'ü' | 'ú' => 'u',
        'ÿ' => 'y',
        other => other,
    }
}

fn lookup_key(word: &str) -> String {
    word.chars()
        .flat_map(char::to_lowercase)
        .map(strip_accents)
        .collect()
}

/// Un mot d'au moins deux lettres dont toutes les lettres sont majuscules.
fn is_all_caps(word: &str) -> bool {
    let letters: Vec<char> = word.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
}

fn normalize_word(word: &str) -> String {
    if is_all_caps(word) {
        return word.to_string();
    }
    match vocabulaire().get(&lookup_key(word)) {
        Some(canonique) => (*canonique).to_string(),
        None => word.to_string(),
    }
}

/// Découpe une chaîne en segments alternant mots et séparateurs.
fn segments(input: &str) -> Vec<(bool, &str)> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_word: Option<bool> = None;

    for (idx, c) in input.char_indices() {
        let is_word = c.is_alphanumeric();
        match in_word {
            Some(current) if current != is_word => {
                out.push((current, &input[start..idx]));
                start = idx;
                in_word = Some(is_word);
            }
            None => in_word = Some(is_word),
            _ => {}
        }
    }
    if let Some(current) = in_word {
        out.push((current, &input[start..]));
    }
    out
}

/// Normalise une saisie libre (profession, lieu, domicile).
///
/// `normalize_text(normalize_text(s)) == normalize_text(s)` pour toute entrée.
pub fn normalize_text(input: &str) -> String {
    segments(input)
        .into_iter()
        .map(|(is_word, segment)| {
            if is_word {
                normalize_word(segment)
            } else {
                segment.to_string()
            }
        })
        .collect()
}

fn capitalize(part: &str) -> String {
    let mut chars = part.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}

/// Met un nom propre en forme : "OUMAR" → "Oumar", "jean paul" → "Jean Paul".
///
/// Les espaces multiples sont réduits, les composés à trait d'union ou
/// apostrophe sont capitalisés partie par partie.
pub fn format_name(input: &str) -> String {
    input
        .split_whitespace()
        .map(|word| {
            word.split('-')
                .map(|part| {
                    part.split('\'')
                        .map(capitalize)
                        .collect::<Vec<_>>()
                        .join("'")
                })
                .collect::<Vec<_>>()
                .join("-")
        })
        .collect::<Vec<_>>()
        .join(" ")
}
