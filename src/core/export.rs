// core/export.rs
//! Mise à plat des demandes et des utilisateurs pour l'export tableur.
//!
//! Les colonnes portent des libellés français et les dates sont au format
//! `jj/mm/aaaa`. L'écriture du fichier `.xlsx` est laissée au client.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::demande::Demande;
use crate::domain::user::User;
use crate::utils::dates::format_date;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSheet {
    pub filename: String,
    pub sheet_name: &'static str,
    pub columns: Vec<&'static str>,
    pub rows: Vec<Vec<String>>,
}

/// `{prefix}_AAAA-MM-JJ_HH-MM-SS.xlsx`
pub fn export_filename(prefix: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}.xlsx", prefix, now.format("%Y-%m-%d_%H-%M-%S"))
}

const DEMANDE_COLUMNS: [&str; 10] = [
    "Numéro",
    "Type",
    "Statut",
    "Personne concernée",
    "Demandeur",
    "Email du demandeur",
    "Date de la demande",
    "Date de traitement",
    "Motif de rejet",
    "Dossier complet",
];

/// Une ligne par demande ; `users` sert à retrouver le demandeur.
pub fn demandes_sheet(
    demandes: &[Demande],
    users: &HashMap<Uuid, User>,
    now: DateTime<Utc>,
) -> ExportSheet {
    let rows = demandes
        .iter()
        .map(|demande| {
            let demandeur = demande.user_id.and_then(|id| users.get(&id));
            vec![
                demande.id.to_string(),
                demande.kind().libelle().to_string(),
                demande.statut.code().libelle().to_string(),
                demande.donnees.subject_name(),
                demandeur
                    .map(User::full_name)
                    .unwrap_or_else(|| "Guichet".to_string()),
                demandeur.map(|u| u.email.clone()).unwrap_or_default(),
                format_date(&demande.created_at),
                demande
                    .statut
                    .traitement()
                    .map(|t| format_date(&t.date))
                    .unwrap_or_default(),
                demande.statut.motif().unwrap_or_default().to_string(),
                if demande.is_incomplete() { "Non" } else { "Oui" }.to_string(),
            ]
        })
        .collect();

    ExportSheet {
        filename: export_filename("demandes", now),
        sheet_name: "Demandes",
        columns: DEMANDE_COLUMNS.to_vec(),
        rows,
    }
}

const USER_COLUMNS: [&str; 6] = ["Nom", "Prénom", "Email", "Téléphone", "Rôle", "Date d'inscription"];

pub fn users_sheet(users: &[User], now: DateTime<Utc>) -> ExportSheet {
    let rows = users
        .iter()
        .map(|user| {
            vec![
                user.nom.clone(),
                user.prenom.clone(),
                user.email.clone(),
                user.telephone.clone().unwrap_or_default(),
                user.role.libelle().to_string(),
                format_date(&user.created_at),
            ]
        })
        .collect();

    ExportSheet {
        filename: export_filename("utilisateurs", now),
        sheet_name: "Utilisateurs",
        columns: USER_COLUMNS.to_vec(),
        rows,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::demande::tests::complete_birth;
    use crate::domain::user::{NewUser, Role};
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).unwrap()
    }

    #[test]
    fn test_filename_pattern() {
        assert_eq!(export_filename("demandes", now()), "demandes_2024-03-05_14-07-09.xlsx");
    }

    #[test]
    fn test_demandes_rows() {
        let user = User::new(
            &NewUser {
                nom: "Ba".into(),
                prenom: "Oumar".into(),
                email: "oumar@example.mr".into(),
                telephone: None,
                password: "motdepasse".into(),
            },
            "hash".into(),
            Role::User,
        );
        let mut rejected = Demande::new(complete_birth(), Some(user.id), None);
        rejected.created_at = Utc.timestamp_opt(1705330800, 0).unwrap();
        rejected.reject("Doublon", None).unwrap();
        let guichet = Demande::new(complete_birth(), None, Some(Uuid::new_v4()));

        let users = HashMap::from([(user.id, user)]);
        let sheet = demandes_sheet(&[rejected, guichet], &users, now());

        assert_eq!(sheet.columns.len(), sheet.rows[0].len());
        assert_eq!(sheet.rows[0][1], "Acte de naissance");
        assert_eq!(sheet.rows[0][2], "Rejetée");
        assert_eq!(sheet.rows[0][3], "Oumar Ba");
        assert_eq!(sheet.rows[0][4], "Oumar Ba");
        assert_eq!(sheet.rows[0][6], "15/01/2024");
        assert_eq!(sheet.rows[0][8], "Doublon");
        assert_eq!(sheet.rows[1][4], "Guichet");
        assert_eq!(sheet.rows[1][7], "");
    }

    #[test]
    fn test_users_rows() {
        let user = User::new(
            &NewUser {
                nom: "Sow".into(),
                prenom: "Aïssata".into(),
                email: "a@example.mr".into(),
                telephone: Some("22 00 00 00".into()),
                password: "motdepasse".into(),
            },
            "hash".into(),
            Role::Agent,
        );
        let sheet = users_sheet(&[user], now());
        assert_eq!(sheet.filename, "utilisateurs_2024-03-05_14-07-09.xlsx");
        assert_eq!(sheet.rows[0][4], "Agent");
        assert_eq!(sheet.rows[0][3], "22 00 00 00");
    }
}
