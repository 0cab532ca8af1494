//! Acte d'état civil délivré pour une demande acceptée.
//!
//! Le document est bilingue (français / arabe), au format A4, et porte l'URL
//! publique de vérification `{PUBLIC_URL}/verification/{id}`, imprimée et
//! encodée dans un QR code SVG. La conversion HTML → PDF est laissée à un
//! outil externe.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use qrcode::{render::svg, QrCode};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::demande::{Demande, DemandeType, StatutCode, TransitionError};
use crate::domain::wizard::{schema, FieldKind};
use crate::utils::dates::{format_date, format_date_str};

/// Une ligne de l'acte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActeLine {
    pub label: &'static str,
    pub label_ar: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Acte {
    pub demande_id: Uuid,
    #[serde(rename = "type")]
    pub kind: DemandeType,
    pub titre: &'static str,
    pub titre_ar: &'static str,
    pub lignes: Vec<ActeLine>,
    pub date_traitement: DateTime<Utc>,
    pub verification_url: String,
    pub code_verification: String,
    /// QR code de `verification_url`, en data URL `image/svg+xml`.
    pub qr_code: Option<String>,
}

fn label_ar(key: &str) -> &'static str {
    match key {
        "nomEnfant" => "اسم العائلة للمولود",
        "prenomEnfant" => "الاسم الشخصي للمولود",
        "sexe" => "الجنس",
        "dateNaissance" => "تاريخ الميلاد",
        "heureNaissance" => "ساعة الميلاد",
        "lieuNaissance" => "مكان الميلاد",
        "nomPere" => "اسم الأب العائلي",
        "prenomPere" => "الاسم الشخصي للأب",
        "professionPere" => "مهنة الأب",
        "nomMere" => "اسم الأم العائلي",
        "prenomMere" => "الاسم الشخصي للأم",
        "professionMere" => "مهنة الأم",
        "domicileParents" => "محل إقامة الوالدين",
        "nomEpoux" => "اسم الزوج العائلي",
        "prenomEpoux" => "الاسم الشخصي للزوج",
        "dateNaissanceEpoux" => "تاريخ ميلاد الزوج",
        "lieuNaissanceEpoux" => "مكان ميلاد الزوج",
        "professionEpoux" => "مهنة الزوج",
        "nomEpouse" => "اسم الزوجة العائلي",
        "prenomEpouse" => "الاسم الشخصي للزوجة",
        "dateNaissanceEpouse" => "تاريخ ميلاد الزوجة",
        "lieuNaissanceEpouse" => "مكان ميلاد الزوجة",
        "professionEpouse" => "مهنة الزوجة",
        "dateMariage" => "تاريخ الزواج",
        "lieuMariage" => "مكان الزواج",
        "domicile" => "محل الإقامة",
        "temoin1" => "الشاهد الأول",
        "temoin2" => "الشاهد الثاني",
        "nomDefunt" => "اسم المتوفى العائلي",
        "prenomDefunt" => "الاسم الشخصي للمتوفى",
        "dateNaissanceDefunt" => "تاريخ ميلاد المتوفى",
        "lieuNaissanceDefunt" => "مكان ميلاد المتوفى",
        "professionDefunt" => "مهنة المتوفى",
        "domicileDefunt" => "محل إقامة المتوفى",
        "dateDeces" => "تاريخ الوفاة",
        "lieuDeces" => "مكان الوفاة",
        "causeDeces" => "سبب الوفاة",
        "nomDeclarant" => "اسم المصرح العائلي",
        "prenomDeclarant" => "الاسم الشخصي للمصرح",
        "lienDeclarant" => "صلة المصرح بالمتوفى",
        _ => "",
    }
}

impl Acte {
    /// Construit l'acte d'une demande acceptée.
    pub fn from_demande(
        demande: &Demande,
        public_url: &str,
        code_verification: String,
    ) -> Result<Self, TransitionError> {
        let traitement = match demande.statut.code() {
            StatutCode::Acceptee => demande.statut.traitement(),
            _ => None,
        }
        .ok_or_else(|| {
            TransitionError::InvalidData("Seule une demande acceptée donne lieu à un acte".to_string())
        })?;

        let kind = demande.kind();
        let donnees = demande.donnees.to_map();
        let lignes = schema(kind)
            .fields()
            // Ni la pièce d'identité ni les NNI ne figurent sur l'acte.
            .filter(|field| !matches!(field.kind, FieldKind::Image | FieldKind::Nni))
            .filter_map(|field| {
                let value = donnees.get(field.key)?.as_str()?.trim();
                if value.is_empty() {
                    return None;
                }
                let value = match field.kind {
                    FieldKind::Date => format_date_str(value),
                    FieldKind::Choice(_) if field.key == "sexe" => match value {
                        "M" => "Masculin / ذكر".to_string(),
                        "F" => "Féminin / أنثى".to_string(),
                        other => other.to_string(),
                    },
                    _ => value.to_string(),
                };
                Some(ActeLine { label: field.label, label_ar: label_ar(field.key), value })
            })
            .collect();

        let verification_url = verification_url(public_url, demande.id);
        Ok(Self {
            demande_id: demande.id,
            kind,
            titre: kind.libelle(),
            titre_ar: kind.libelle_ar(),
            lignes,
            date_traitement: traitement.date,
            qr_code: qr_data_url(&verification_url),
            verification_url,
            code_verification,
        })
    }

    /// Rendu HTML A4 de l'acte.
    pub fn render_html(&self) -> String {
        let qr = match &self.qr_code {
            Some(src) => format!(
                "<img class=\"qr\" src=\"{}\" alt=\"QR code de vérification\" width=\"110\" height=\"110\">",
                src
            ),
            None => String::new(),
        };
        let lignes: String = self
            .lignes
            .iter()
            .map(|ligne| {
                format!(
                    "      <tr><th>{}</th><td>{}</td><th class=\"ar\" dir=\"rtl\">{}</th></tr>\n",
                    escape_html(ligne.label),
                    escape_html(&ligne.value),
                    escape_html(ligne.label_ar),
                )
            })
            .collect();

        format!(
            r#"<!DOCTYPE html>
<html lang="fr">
<head>
  <meta charset="utf-8">
  <title>{titre}</title>
  <style>
    @page {{ size: A4; margin: 20mm; }}
    body {{ font-family: "Times New Roman", serif; width: 170mm; margin: 0 auto; }}
    header {{ display: flex; justify-content: space-between; text-align: center; }}
    h1 {{ text-align: center; font-size: 20pt; margin: 12mm 0 2mm; }}
    h2 {{ text-align: center; font-size: 18pt; margin: 0 0 10mm; }}
    table {{ width: 100%; border-collapse: collapse; }}
    th, td {{ border-bottom: 1px solid #999; padding: 3mm 2mm; text-align: left; }}
    .ar {{ text-align: right; }}
    footer {{ margin-top: 15mm; display: flex; justify-content: space-between; font-size: 10pt; }}
  </style>
</head>
<body>
  <header>
    <div>République Islamique de Mauritanie<br>Honneur - Fraternité - Justice</div>
    <div dir="rtl">الجمهورية الإسلامية الموريتانية<br>شرف - إخاء - عدل</div>
  </header>
  <h1>{titre}</h1>
  <h2 dir="rtl">{titre_ar}</h2>
  <table>
{lignes}  </table>
  <footer>
    <div>
      Délivré le {date}<br>
      Code de vérification : <strong>{code}</strong><br>
      Vérification : {url}
    </div>
    {qr}
  </footer>
</body>
</html>
"#,
            titre = escape_html(self.titre),
            titre_ar = escape_html(self.titre_ar),
            lignes = lignes,
            date = format_date(&self.date_traitement),
            code = escape_html(&self.code_verification),
            url = escape_html(&self.verification_url),
            qr = qr,
        )
    }
}

/// QR code SVG de l'URL, encodé en data URL base64.
pub fn qr_data_url(url: &str) -> Option<String> {
    match QrCode::new(url.as_bytes()) {
        Ok(code) => {
            let svg = code
                .render::<svg::Color>()
                .min_dimensions(200, 200)
                .dark_color(svg::Color("#000000"))
                .light_color(svg::Color("#ffffff"))
                .build();
            Some(format!(
                "data:image/svg+xml;base64,{}",
                general_purpose::STANDARD.encode(svg.as_bytes())
            ))
        }
        Err(e) => {
            tracing::warn!(error = %e, "QR code de vérification impossible à générer");
            None
        }
    }
}

pub fn verification_url(public_url: &str, id: Uuid) -> String {
    format!("{}/verification/{}", public_url.trim_end_matches('/'), id)
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
