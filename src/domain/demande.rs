//! # Demandes d'actes d'état civil
//!
//! Une demande porte un type fixé à la création (naissance, mariage, décès),
//! des données propres à ce type et un statut qui suit l'automate :
//!
//! ```text
//! en_attente ──approve──▶ acceptee
//!      │
//!      └─────reject(motif)──▶ rejetee
//! ```
//!
//! `acceptee` et `rejetee` sont terminaux. Un rejet porte toujours un motif
//! non vide, et une demande incomplète ne peut pas être acceptée.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::wizard::{self, FieldRef};
use crate::utils::dates;

/// Type de demande.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DemandeType {
    Naissance,
    Mariage,
    Deces,
}

impl DemandeType {
    pub const ALL: [DemandeType; 3] = [DemandeType::Naissance, DemandeType::Mariage, DemandeType::Deces];

    pub fn as_str(&self) -> &'static str {
        match self {
            DemandeType::Naissance => "naissance",
            DemandeType::Mariage => "mariage",
            DemandeType::Deces => "deces",
        }
    }

    /// Intitulé de l'acte en français.
    pub fn libelle(&self) -> &'static str {
        match self {
            DemandeType::Naissance => "Acte de naissance",
            DemandeType::Mariage => "Acte de mariage",
            DemandeType::Deces => "Acte de décès",
        }
    }

    /// Intitulé de l'acte en arabe.
    pub fn libelle_ar(&self) -> &'static str {
        match self {
            DemandeType::Naissance => "شهادة ميلاد",
            DemandeType::Mariage => "عقد زواج",
            DemandeType::Deces => "شهادة وفاة",
        }
    }
}

impl fmt::Display for DemandeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DemandeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naissance" => Ok(DemandeType::Naissance),
            "mariage" => Ok(DemandeType::Mariage),
            "deces" => Ok(DemandeType::Deces),
            other => Err(format!("Type de demande inconnu: {}", other)),
        }
    }
}

/// Code de statut tel qu'il circule sur le réseau et en base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatutCode {
    EnAttente,
    Acceptee,
    Rejetee,
}

impl StatutCode {
    pub const ALL: [StatutCode; 3] = [StatutCode::EnAttente, StatutCode::Acceptee, StatutCode::Rejetee];

    pub fn as_str(&self) -> &'static str {
        match self {
            StatutCode::EnAttente => "en_attente",
            StatutCode::Acceptee => "acceptee",
            StatutCode::Rejetee => "rejetee",
        }
    }

    pub fn libelle(&self) -> &'static str {
        match self {
            StatutCode::EnAttente => "En attente",
            StatutCode::Acceptee => "Acceptée",
            StatutCode::Rejetee => "Rejetée",
        }
    }
}

impl fmt::Display for StatutCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatutCode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "en_attente" => Ok(StatutCode::EnAttente),
            "acceptee" => Ok(StatutCode::Acceptee),
            "rejetee" => Ok(StatutCode::Rejetee),
            other => Err(format!("Statut inconnu: {}", other)),
        }
    }
}

/// Motif de rejet, jamais vide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RejectionReason(String);

impl RejectionReason {
    pub fn new(motif: &str) -> Result<Self, TransitionError> {
        let motif = motif.trim();
        if motif.is_empty() {
            Err(TransitionError::EmptyReason)
        } else {
            Ok(Self(motif.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for RejectionReason {
    type Error = TransitionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<RejectionReason> for String {
    fn from(reason: RejectionReason) -> Self {
        reason.0
    }
}

/// Qui a traité la demande, et quand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Traitement {
    pub agent_id: Option<Uuid>,
    pub date: DateTime<Utc>,
}

/// Statut d'une demande. Un rejet sans motif n'est pas représentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statut {
    EnAttente,
    Acceptee(Traitement),
    Rejetee { traitement: Traitement, motif: RejectionReason },
}

impl Statut {
    pub fn code(&self) -> StatutCode {
        match self {
            Statut::EnAttente => StatutCode::EnAttente,
            Statut::Acceptee(_) => StatutCode::Acceptee,
            Statut::Rejetee { .. } => StatutCode::Rejetee,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Statut::EnAttente)
    }

    pub fn motif(&self) -> Option<&str> {
        match self {
            Statut::Rejetee { motif, .. } => Some(motif.as_str()),
            _ => None,
        }
    }

    pub fn traitement(&self) -> Option<&Traitement> {
        match self {
            Statut::EnAttente => None,
            Statut::Acceptee(traitement) | Statut::Rejetee { traitement, .. } => Some(traitement),
        }
    }

    /// Reconstruit un statut à partir de ses colonnes stockées.
    /// `fallback` date le traitement quand elle n'a pas été enregistrée.
    pub fn from_parts(
        code: StatutCode,
        motif: Option<&str>,
        traitee_par: Option<Uuid>,
        date_traitement: Option<DateTime<Utc>>,
        fallback: DateTime<Utc>,
    ) -> Result<Self, TransitionError> {
        let traitement = Traitement {
            agent_id: traitee_par,
            date: date_traitement.unwrap_or(fallback),
        };
        match code {
            StatutCode::EnAttente => Ok(Statut::EnAttente),
            StatutCode::Acceptee => Ok(Statut::Acceptee(traitement)),
            StatutCode::Rejetee => Ok(Statut::Rejetee {
                traitement,
                motif: RejectionReason::new(motif.unwrap_or_default())?,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("La demande a déjà été traitée (statut: {0})")]
    AlreadyProcessed(StatutCode),
    #[error("La demande est incomplète")]
    Incomplete(Vec<FieldRef>),
    #[error("Le motif de rejet est obligatoire")]
    EmptyReason,
    #[error("Le type d'une demande ne peut pas être modifié")]
    TypeChange,
    #[error("Données de demande invalides: {0}")]
    InvalidData(String),
}

/// Données d'une demande de naissance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct BirthRecord {
    pub nom_enfant: String,
    pub prenom_enfant: String,
    pub sexe: String,
    #[serde(deserialize_with = "dates::lenient_date_string")]
    pub date_naissance: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heure_naissance: Option<String>,
    pub lieu_naissance: String,
    pub nom_pere: String,
    pub prenom_pere: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession_pere: Option<String>,
    pub nom_mere: String,
    pub prenom_mere: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession_mere: Option<String>,
    pub domicile_parents: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nni_declarant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carte_identite: Option<String>,
}

/// Données d'une demande de mariage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct MarriageRecord {
    pub nom_epoux: String,
    pub prenom_epoux: String,
    #[serde(deserialize_with = "dates::lenient_date_string")]
    pub date_naissance_epoux: String,
    pub lieu_naissance_epoux: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession_epoux: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nni_epoux: Option<String>,
    pub nom_epouse: String,
    pub prenom_epouse: String,
    #[serde(deserialize_with = "dates::lenient_date_string")]
    pub date_naissance_epouse: String,
    pub lieu_naissance_epouse: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession_epouse: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nni_epouse: Option<String>,
    #[serde(deserialize_with = "dates::lenient_date_string")]
    pub date_mariage: String,
    pub lieu_mariage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domicile: Option<String>,
    pub temoin1: String,
    pub temoin2: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carte_identite: Option<String>,
}

/// Données d'une demande de décès.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct DeathRecord {
    pub nom_defunt: String,
    pub prenom_defunt: String,
    #[serde(
        deserialize_with = "dates::lenient_date_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub date_naissance_defunt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lieu_naissance_defunt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profession_defunt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domicile_defunt: Option<String>,
    #[serde(deserialize_with = "dates::lenient_date_string")]
    pub date_deces: String,
    pub lieu_deces: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cause_deces: Option<String>,
    pub nom_declarant: String,
    pub prenom_declarant: String,
    pub lien_declarant: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nni_declarant: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carte_identite: Option<String>,
}

/// Données d'une demande, une variante par type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DemandeData {
    Naissance(BirthRecord),
    Mariage(MarriageRecord),
    Deces(DeathRecord),
}

impl DemandeData {
    /// Construit les données à partir de l'objet `donnees` reçu.
    pub fn from_parts(kind: DemandeType, donnees: Value) -> Result<Self, serde_json::Error> {
        let donnees = match donnees {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        Ok(match kind {
            DemandeType::Naissance => DemandeData::Naissance(serde_json::from_value(donnees)?),
            DemandeType::Mariage => DemandeData::Mariage(serde_json::from_value(donnees)?),
            DemandeType::Deces => DemandeData::Deces(serde_json::from_value(donnees)?),
        })
    }

    pub fn kind(&self) -> DemandeType {
        match self {
            DemandeData::Naissance(_) => DemandeType::Naissance,
            DemandeData::Mariage(_) => DemandeType::Mariage,
            DemandeData::Deces(_) => DemandeType::Deces,
        }
    }

    /// Objet JSON `donnees` (champs camelCase, optionnels absents omis).
    pub fn to_map(&self) -> Map<String, Value> {
        let value = match self {
            DemandeData::Naissance(record) => serde_json::to_value(record),
            DemandeData::Mariage(record) => serde_json::to_value(record),
            DemandeData::Deces(record) => serde_json::to_value(record),
        };
        match value {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.to_map())
    }

    /// Valeur textuelle d'un champ, chaîne vide si absent.
    pub fn field(&self, key: &str) -> String {
        match self.to_map().get(key) {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        }
    }

    /// Champs obligatoires laissés vides.
    pub fn missing_fields(&self) -> Vec<FieldRef> {
        wizard::missing_required(self.kind(), &self.to_map())
    }

    pub fn is_incomplete(&self) -> bool {
        !self.missing_fields().is_empty()
    }

    /// Nom de la personne concernée par l'acte.
    pub fn subject_name(&self) -> String {
        let full = |prenom: &str, nom: &str| format!("{} {}", prenom.trim(), nom.trim()).trim().to_string();
        match self {
            DemandeData::Naissance(r) => full(&r.prenom_enfant, &r.nom_enfant),
            DemandeData::Mariage(r) => format!(
                "{} & {}",
                full(&r.prenom_epoux, &r.nom_epoux),
                full(&r.prenom_epouse, &r.nom_epouse)
            ),
            DemandeData::Deces(r) => full(&r.prenom_defunt, &r.nom_defunt),
        }
    }

    /// Noms des champs de chaque type, dans l'ordre du formulaire.
    pub fn field_names(kind: DemandeType) -> &'static [&'static str] {
        match kind {
            DemandeType::Naissance => &[
                "nomEnfant", "prenomEnfant", "sexe", "dateNaissance", "heureNaissance",
                "lieuNaissance", "nomPere", "prenomPere", "professionPere", "nomMere",
                "prenomMere", "professionMere", "domicileParents", "nniDeclarant",
                "carteIdentite",
            ],
            DemandeType::Mariage => &[
                "nomEpoux", "prenomEpoux", "dateNaissanceEpoux", "lieuNaissanceEpoux",
                "professionEpoux", "nniEpoux", "nomEpouse", "prenomEpouse",
                "dateNaissanceEpouse", "lieuNaissanceEpouse", "professionEpouse", "nniEpouse",
                "dateMariage", "lieuMariage", "domicile", "temoin1", "temoin2", "carteIdentite",
            ],
            DemandeType::Deces => &[
                "nomDefunt", "prenomDefunt", "dateNaissanceDefunt", "lieuNaissanceDefunt",
                "professionDefunt", "domicileDefunt", "dateDeces", "lieuDeces", "causeDeces",
                "nomDeclarant", "prenomDeclarant", "lienDeclarant", "nniDeclarant",
                "carteIdentite",
            ],
        }
    }
}

/// Vrai si un champ obligatoire du type est vide (ou si `donnees` n'est pas un objet).
pub fn is_request_incomplete(kind: DemandeType, donnees: &Value) -> bool {
    match donnees {
        Value::Object(map) => !wizard::missing_required(kind, map).is_empty(),
        _ => true,
    }
}

/// Une demande d'acte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Demande {
    pub id: Uuid,
    pub donnees: DemandeData,
    pub statut: Statut,
    /// Citoyen demandeur, `None` pour une saisie au guichet.
    pub user_id: Option<Uuid>,
    /// Agent ayant saisi la demande au guichet.
    pub agent_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Demande {
    pub fn new(donnees: DemandeData, user_id: Option<Uuid>, agent_id: Option<Uuid>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            donnees,
            statut: Statut::EnAttente,
            user_id,
            agent_id,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn kind(&self) -> DemandeType {
        self.donnees.kind()
    }

    pub fn is_pending(&self) -> bool {
        !self.statut.is_terminal()
    }

    pub fn is_incomplete(&self) -> bool {
        self.donnees.is_incomplete()
    }

    pub fn can_approve(&self) -> bool {
        self.is_pending() && !self.is_incomplete()
    }

    fn ensure_pending(&self) -> Result<(), TransitionError> {
        if self.statut.is_terminal() {
            Err(TransitionError::AlreadyProcessed(self.statut.code()))
        } else {
            Ok(())
        }
    }

    /// `en_attente → acceptee`, refusé si la demande est incomplète.
    pub fn approve(&mut self, agent: Option<Uuid>) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        let missing = self.donnees.missing_fields();
        if !missing.is_empty() {
            return Err(TransitionError::Incomplete(missing));
        }
        let now = Utc::now();
        self.statut = Statut::Acceptee(Traitement { agent_id: agent, date: now });
        self.updated_at = now;
        Ok(())
    }

    /// `en_attente → rejetee`, avec un motif non vide.
    pub fn reject(&mut self, motif: &str, agent: Option<Uuid>) -> Result<(), TransitionError> {
        let motif = RejectionReason::new(motif)?;
        self.ensure_pending()?;
        let now = Utc::now();
        self.statut = Statut::Rejetee {
            traitement: Traitement { agent_id: agent, date: now },
            motif,
        };
        self.updated_at = now;
        Ok(())
    }

    /// Remplace les données tant que la demande est en attente ; le type ne change pas.
    pub fn edit(&mut self, donnees: DemandeData) -> Result<(), TransitionError> {
        self.ensure_pending()?;
        if donnees.kind() != self.kind() {
            return Err(TransitionError::TypeChange);
        }
        self.donnees = donnees;
        self.updated_at = Utc::now();
        Ok(())
    }
}

/// Représentation JSON d'une demande.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DemandeView {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: DemandeType,
    pub donnees: Value,
    pub statut: StatutCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motif_rejet: Option<String>,
    #[serde(default)]
    pub user_id: Option<Uuid>,
    #[serde(default)]
    pub agent_id: Option<Uuid>,
    #[serde(default)]
    pub traitee_par: Option<Uuid>,
    #[serde(default, with = "dates::flexible_option")]
    pub date_traitement: Option<DateTime<Utc>>,
    #[serde(with = "dates::flexible", alias = "dateDemande")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "dates::flexible_option")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Calculé : un champ obligatoire est vide.
    #[serde(default)]
    pub incomplete: bool,
}

impl DemandeView {
    pub fn is_pending(&self) -> bool {
        self.statut == StatutCode::EnAttente
    }
}

impl From<&Demande> for DemandeView {
    fn from(demande: &Demande) -> Self {
        let traitement = demande.statut.traitement();
        Self {
            id: demande.id,
            kind: demande.kind(),
            donnees: demande.donnees.to_value(),
            statut: demande.statut.code(),
            motif_rejet: demande.statut.motif().map(str::to_string),
            user_id: demande.user_id,
            agent_id: demande.agent_id,
            traitee_par: traitement.and_then(|t| t.agent_id),
            date_traitement: traitement.map(|t| t.date),
            created_at: demande.created_at,
            updated_at: Some(demande.updated_at),
            incomplete: demande.is_incomplete(),
        }
    }
}

impl TryFrom<DemandeView> for Demande {
    type Error = TransitionError;

    fn try_from(view: DemandeView) -> Result<Self, Self::Error> {
        let updated_at = view.updated_at.unwrap_or(view.created_at);
        let donnees = DemandeData::from_parts(view.kind, view.donnees)
            .map_err(|e| TransitionError::InvalidData(e.to_string()))?;
        let statut = Statut::from_parts(
            view.statut,
            view.motif_rejet.as_deref(),
            view.traitee_par,
            view.date_traitement,
            updated_at,
        )?;
        Ok(Self {
            id: view.id,
            donnees,
            statut,
            user_id: view.user_id,
            agent_id: view.agent_id,
            created_at: view.created_at,
            updated_at,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn complete_birth() -> DemandeData {
        DemandeData::from_parts(
            DemandeType::Naissance,
            json!({
                "nomEnfant": "Ba",
                "prenomEnfant": "Oumar",
                "sexe": "M",
                "dateNaissance": "2024-01-15",
                "lieuNaissance": "Kaédi",
                "nomPere": "Ba",
                "prenomPere": "Mamadou",
                "nomMere": "Sow",
                "prenomMere": "Aïssata",
                "domicileParents": "Tevragh Zeina",
            }),
        )
        .unwrap()
    }

    #[test]
    fn test_missing_nom_enfant_is_incomplete() {
        let mut donnees = complete_birth().to_value();
        assert!(!is_request_incomplete(DemandeType::Naissance, &donnees));

        donnees["nomEnfant"] = json!("");
        assert!(is_request_incomplete(DemandeType::Naissance, &donnees));

        let mut demande = Demande::new(
            DemandeData::from_parts(DemandeType::Naissance, donnees).unwrap(),
            None,
            None,
        );
        assert!(!demande.can_approve());
        match demande.approve(None) {
            Err(TransitionError::Incomplete(fields)) => {
                assert_eq!(fields.iter().map(|f| f.key).collect::<Vec<_>>(), vec!["nomEnfant"]);
            }
            other => panic!("approbation inattendue: {:?}", other),
        }
        assert_eq!(demande.statut, Statut::EnAttente);
    }

    #[test]
    fn test_accepted_is_terminal() {
        let mut demande = Demande::new(complete_birth(), Some(Uuid::new_v4()), None);
        let agent = Uuid::new_v4();
        demande.approve(Some(agent)).unwrap();
        assert_eq!(demande.statut.code(), StatutCode::Acceptee);
        assert_eq!(demande.statut.traitement().unwrap().agent_id, Some(agent));

        assert_eq!(
            demande.approve(None),
            Err(TransitionError::AlreadyProcessed(StatutCode::Acceptee))
        );
        assert_eq!(
            demande.reject("doublon", None),
            Err(TransitionError::AlreadyProcessed(StatutCode::Acceptee))
        );
        assert_eq!(
            demande.edit(complete_birth()),
            Err(TransitionError::AlreadyProcessed(StatutCode::Acceptee))
        );
        assert_eq!(demande.statut.code(), StatutCode::Acceptee);
    }

    #[test]
    fn test_reject_requires_reason() {
        let mut demande = Demande::new(complete_birth(), None, None);
        assert_eq!(demande.reject("   ", None), Err(TransitionError::EmptyReason));
        assert!(demande.is_pending());

        demande.reject(" Pièces illisibles ", None).unwrap();
        assert_eq!(demande.statut.motif(), Some("Pièces illisibles"));
        assert!(demande.approve(None).is_err());
    }

    #[test]
    fn test_edit_keeps_type() {
        let mut demande = Demande::new(complete_birth(), None, None);
        let deces = DemandeData::from_parts(DemandeType::Deces, json!({})).unwrap();
        assert_eq!(demande.edit(deces), Err(TransitionError::TypeChange));

        let mut donnees = complete_birth().to_value();
        donnees["lieuNaissance"] = json!("Rosso");
        demande
            .edit(DemandeData::from_parts(DemandeType::Naissance, donnees).unwrap())
            .unwrap();
        assert_eq!(demande.donnees.field("lieuNaissance"), "Rosso");
    }

    #[test]
    fn test_record_fields_match_field_names() {
        for kind in DemandeType::ALL {
            let full: Map<String, Value> = DemandeData::field_names(kind)
                .iter()
                .map(|key| {
                    let value = if key.starts_with("date") { "2024-01-15" } else { "x" };
                    (key.to_string(), json!(value))
                })
                .collect();
            let data = DemandeData::from_parts(kind, Value::Object(full.clone())).unwrap();
            assert_eq!(data.to_map(), full, "{:?}", kind);
        }
    }

    #[test]
    fn test_unknown_fields_are_refused() {
        let result = DemandeData::from_parts(DemandeType::Deces, json!({ "nomEnfant": "x" }));
        assert!(result.is_err());
    }

    #[test]
    fn test_view_accepts_seconds_and_iso_dates() {
        let view: DemandeView = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "type": "naissance",
            "donnees": complete_birth().to_value(),
            "statut": "rejetee",
            "motifRejet": "Doublon",
            "dateDemande": { "_seconds": 1705330800 },
        }))
        .unwrap();
        assert_eq!(dates::format_date(&view.created_at), "15/01/2024");

        let demande = Demande::try_from(view).unwrap();
        assert_eq!(demande.statut.motif(), Some("Doublon"));
        assert_eq!(demande.kind(), DemandeType::Naissance);
    }

    #[test]
    fn test_view_rejected_without_reason_is_refused() {
        let view: DemandeView = serde_json::from_value(json!({
            "id": Uuid::new_v4(),
            "type": "deces",
            "donnees": {},
            "statut": "rejetee",
            "createdAt": "2024-01-15T15:00:00Z",
        }))
        .unwrap();
        assert_eq!(Demande::try_from(view), Err(TransitionError::EmptyReason));
    }

    #[test]
    fn test_view_roundtrip_keeps_statut() {
        let mut demande = Demande::new(complete_birth(), Some(Uuid::new_v4()), None);
        demande.reject("Acte déjà délivré", Some(Uuid::new_v4())).unwrap();

        let view = DemandeView::from(&demande);
        let json = serde_json::to_value(&view).unwrap();
        assert_eq!(json["statut"], "rejetee");
        assert_eq!(json["motifRejet"], "Acte déjà délivré");
        assert_eq!(json["type"], "naissance");

        let back: DemandeView = serde_json::from_value(json).unwrap();
        assert_eq!(Demande::try_from(back).unwrap().statut, demande.statut);
    }
}
