use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{query, query_as, query_scalar, FromRow, Pool, Postgres};
use uuid::Uuid;

use super::{DemandeFilter, DemandeStore, StatusCount};
use crate::domain::demande::{Demande, DemandeType, DemandeView, StatutCode};
use crate::infrastructure::error::{AppError, AppResult};

/// Repository PostgreSQL des demandes
#[derive(Clone)]
pub struct DemandesRepository {
    pool: Pool<Postgres>,
}

/// Ligne de la table `demandes`
#[derive(Debug, FromRow)]
struct DemandeRow {
    id: Uuid,
    type_demande: String,
    donnees: serde_json::Value,
    statut: String,
    motif_rejet: Option<String>,
    user_id: Option<Uuid>,
    agent_id: Option<Uuid>,
    traitee_par: Option<Uuid>,
    date_traitement: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DemandeRow> for Demande {
    type Error = AppError;

    fn try_from(row: DemandeRow) -> Result<Self, Self::Error> {
        let corrupt = |e: String| AppError::InternalError(format!("Demande {} illisible: {}", row.id, e));
        let view = DemandeView {
            id: row.id,
            kind: row.type_demande.parse().map_err(corrupt)?,
            statut: row.statut.parse().map_err(corrupt)?,
            donnees: row.donnees,
            motif_rejet: row.motif_rejet,
            user_id: row.user_id,
            agent_id: row.agent_id,
            traitee_par: row.traitee_par,
            date_traitement: row.date_traitement,
            created_at: row.created_at,
            updated_at: Some(row.updated_at),
            incomplete: false,
        };
        Demande::try_from(view).map_err(|e| corrupt(e.to_string()))
    }
}

const SELECT_DEMANDE: &str = r#"
    SELECT id, type_demande, donnees, statut, motif_rejet, user_id, agent_id,
           traitee_par, date_traitement, created_at, updated_at
    FROM demandes
"#;

impl DemandesRepository {
    /// Crée une nouvelle instance du repository
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Après une écriture conditionnelle sans effet : absente ou déjà traitée ?
    async fn not_pending_error(&self, id: Uuid) -> AppResult<AppError> {
        let statut: Option<String> = query_scalar("SELECT statut FROM demandes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match statut {
            None => AppError::NotFound("Demande".to_string()),
            Some(statut) => AppError::Conflict(format!(
                "La demande a déjà été traitée (statut: {})",
                statut
            )),
        })
    }
}

#[async_trait]
impl DemandeStore for DemandesRepository {
    async fn insert_demande(&self, demande: &Demande) -> AppResult<()> {
        query(
            r#"
            INSERT INTO demandes (
                id, type_demande, donnees, statut, motif_rejet, user_id, agent_id,
                traitee_par, date_traitement, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(demande.id)
        .bind(demande.kind().as_str())
        .bind(demande.donnees.to_value())
        .bind(demande.statut.code().as_str())
        .bind(demande.statut.motif())
        .bind(demande.user_id)
        .bind(demande.agent_id)
        .bind(demande.statut.traitement().and_then(|t| t.agent_id))
        .bind(demande.statut.traitement().map(|t| t.date))
        .bind(demande.created_at)
        .bind(demande.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_demande(&self, id: Uuid) -> AppResult<Option<Demande>> {
        let row = query_as::<_, DemandeRow>(&format!("{} WHERE id = $1", SELECT_DEMANDE))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Demande::try_from).transpose()
    }

    async fn list_demandes(&self, filter: &DemandeFilter) -> AppResult<Vec<Demande>> {
        let rows = query_as::<_, DemandeRow>(&format!(
            r#"{}
            WHERE ($1::varchar IS NULL OR statut = $1)
              AND ($2::varchar IS NULL OR type_demande = $2)
              AND ($3::uuid IS NULL OR user_id = $3)
            ORDER BY created_at DESC
            LIMIT $4 OFFSET $5
            "#,
            SELECT_DEMANDE
        ))
        .bind(filter.statut.map(|s| s.as_str()))
        .bind(filter.kind.map(|k| k.as_str()))
        .bind(filter.user_id)
        .bind(filter.limit)
        .bind(filter.offset)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Demande::try_from).collect()
    }

    async fn update_donnees(&self, demande: &Demande) -> AppResult<()> {
        let result = query(
            r#"
            UPDATE demandes
            SET donnees = $2, updated_at = $3
            WHERE id = $1 AND type_demande = $4 AND statut = 'en_attente'
            "#,
        )
        .bind(demande.id)
        .bind(demande.donnees.to_value())
        .bind(demande.updated_at)
        .bind(demande.kind().as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_pending_error(demande.id).await?);
        }
        Ok(())
    }

    async fn save_transition(&self, demande: &Demande) -> AppResult<()> {
        let result = query(
            r#"
            UPDATE demandes
            SET statut = $2, motif_rejet = $3, traitee_par = $4,
                date_traitement = $5, updated_at = $6
            WHERE id = $1 AND statut = 'en_attente'
            "#,
        )
        .bind(demande.id)
        .bind(demande.statut.code().as_str())
        .bind(demande.statut.motif())
        .bind(demande.statut.traitement().and_then(|t| t.agent_id))
        .bind(demande.statut.traitement().map(|t| t.date))
        .bind(demande.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(self.not_pending_error(demande.id).await?);
        }
        Ok(())
    }

    async fn delete_demande(&self, id: Uuid, only_pending: bool) -> AppResult<bool> {
        let result = query(
            "DELETE FROM demandes WHERE id = $1 AND (NOT $2 OR statut = 'en_attente')",
        )
        .bind(id)
        .bind(only_pending)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_demandes(&self) -> AppResult<Vec<StatusCount>> {
        let rows: Vec<(String, String, i64)> = query_as(
            "SELECT statut, type_demande, COUNT(*) FROM demandes GROUP BY statut, type_demande",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(statut, kind, total)| {
                Ok(StatusCount {
                    statut: statut.parse::<StatutCode>().map_err(AppError::InternalError)?,
                    kind: kind.parse::<DemandeType>().map_err(AppError::InternalError)?,
                    total,
                })
            })
            .collect()
    }
}
