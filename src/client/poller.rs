//! Rafraîchissement périodique de la liste des demandes.
//!
//! Une tâche tokio interroge la source à intervalle fixe (plus une gigue
//! aléatoire), double l'attente après chaque échec jusqu'à un plafond et
//! publie le dernier état sur un canal `watch`. Abandonner le
//! [`PollerHandle`] arrête la tâche.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use super::api_client::{ClientError, RegistreClient};
use crate::domain::demande::{DemandeView, StatutCode};
use crate::utils::config::Config;

#[async_trait]
pub trait DemandeSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<DemandeView>, ClientError>;
}

/// Liste interrogée sur l'API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollScope {
    /// Demandes du citoyen connecté.
    Mine,
    /// Toutes les demandes (agents), éventuellement filtrées par statut.
    All(Option<StatutCode>),
}

pub struct RemoteSource {
    client: RegistreClient,
    scope: PollScope,
}

impl RemoteSource {
    pub fn new(client: RegistreClient, scope: PollScope) -> Self {
        Self { client, scope }
    }
}

#[async_trait]
impl DemandeSource for RemoteSource {
    async fn fetch(&self) -> Result<Vec<DemandeView>, ClientError> {
        match self.scope {
            PollScope::Mine => self.client.mes_demandes().await,
            PollScope::All(statut) => self.client.list_demandes(statut).await,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollerConfig {
    pub interval: Duration,
    pub max_backoff: Duration,
    /// Gigue maximale ajoutée à chaque attente.
    pub jitter: Duration,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self::from_seconds(30)
    }
}

impl From<&Config> for PollerConfig {
    fn from(config: &Config) -> Self {
        Self::from_seconds(config.poll_interval_seconds)
    }
}

impl PollerConfig {
    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            interval: Duration::from_secs(seconds.max(1)),
            max_backoff: Duration::from_secs(300),
            jitter: Duration::from_secs(3),
        }
    }

    /// Attente avant le prochain appel : `interval * 2^failures`, plafonnée, plus la gigue.
    pub fn next_delay(&self, failures: u32, jitter: Duration) -> Duration {
        let factor = 2u32.saturating_pow(failures.min(16));
        let base = self
            .interval
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff.max(self.interval));
        base + jitter.min(self.jitter)
    }

    fn random_jitter(&self) -> Duration {
        let max = self.jitter.as_millis() as u64;
        if max == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::thread_rng().gen_range(0..=max))
    }
}

/// Dernier état connu de la liste.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollSnapshot {
    pub demandes: Vec<DemandeView>,
    pub refreshed_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Échecs consécutifs depuis le dernier succès.
    pub failures: u32,
}

pub struct RequestPoller<S> {
    source: Arc<S>,
    config: PollerConfig,
}

impl<S: DemandeSource> RequestPoller<S> {
    pub fn new(source: S, config: PollerConfig) -> Self {
        Self { source: Arc::new(source), config }
    }

    /// Lance la tâche de rafraîchissement ; le premier appel est immédiat.
    pub fn spawn(self) -> PollerHandle {
        let (sender, receiver) = watch::channel(PollSnapshot::default());
        let refresh = Arc::new(Notify::new());
        let task = tokio::spawn(run(self.source, self.config, sender, refresh.clone()));

        PollerHandle { receiver, refresh, task }
    }
}

async fn run<S: DemandeSource>(
    source: Arc<S>,
    config: PollerConfig,
    sender: watch::Sender<PollSnapshot>,
    refresh: Arc<Notify>,
) {
    let mut failures: u32 = 0;

    loop {
        match source.fetch().await {
            Ok(demandes) => {
                failures = 0;
                sender.send_modify(|snapshot| {
                    snapshot.demandes = demandes;
                    snapshot.refreshed_at = Some(Utc::now());
                    snapshot.last_error = None;
                    snapshot.failures = 0;
                });
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                tracing::warn!(failures, error = %e, "Rafraîchissement des demandes impossible");
                sender.send_modify(|snapshot| {
                    snapshot.last_error = Some(e.to_string());
                    snapshot.failures = failures;
                });
            }
        }

        if sender.is_closed() {
            break;
        }

        let delay = config.next_delay(failures, config.random_jitter());
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = refresh.notified() => {}
        }
    }
}

pub struct PollerHandle {
    receiver: watch::Receiver<PollSnapshot>,
    refresh: Arc<Notify>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    pub fn subscribe(&self) -> watch::Receiver<PollSnapshot> {
        self.receiver.clone()
    }

    pub fn snapshot(&self) -> PollSnapshot {
        self.receiver.borrow().clone()
    }

    /// Déclenche un rafraîchissement sans attendre la fin de l'intervalle.
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::api_client::tests::view_of;
    use crate::domain::demande::tests::complete_birth;
    use crate::domain::demande::Demande;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        calls: Arc<AtomicUsize>,
        failures_before_success: usize,
    }

    #[async_trait]
    impl DemandeSource for Scripted {
        async fn fetch(&self) -> Result<Vec<DemandeView>, ClientError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures_before_success {
                Err(ClientError::Api { status: 503, message: "Service indisponible".into() })
            } else {
                Ok(vec![view_of(&Demande::new(complete_birth(), None, None))])
            }
        }
    }

    fn scripted(failures_before_success: usize) -> (Scripted, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (Scripted { calls: calls.clone(), failures_before_success }, calls)
    }

    #[test]
    fn test_backoff_is_exponential_and_capped() {
        let config = PollerConfig::from(&Config::for_tests());
        assert_eq!(config.next_delay(0, Duration::ZERO), Duration::from_secs(30));
        assert_eq!(config.next_delay(1, Duration::ZERO), Duration::from_secs(60));
        assert_eq!(config.next_delay(2, Duration::ZERO), Duration::from_secs(120));
        assert_eq!(config.next_delay(10, Duration::ZERO), Duration::from_secs(300));
        assert_eq!(config.next_delay(u32::MAX, Duration::ZERO), Duration::from_secs(300));
        assert_eq!(
            config.next_delay(0, Duration::from_secs(60)),
            Duration::from_secs(33)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_failures() {
        let (source, calls) = scripted(2);
        let handle = RequestPoller::new(source, PollerConfig::from_seconds(30)).spawn();
        let mut updates = handle.subscribe();

        updates.wait_for(|s| s.failures == 2).await.unwrap();
        assert!(handle.snapshot().last_error.unwrap().contains("indisponible"));

        let snapshot = updates
            .wait_for(|s| s.refreshed_at.is_some())
            .await
            .unwrap()
            .clone();
        assert_eq!(snapshot.failures, 0);
        assert_eq!(snapshot.demandes.len(), 1);
        assert_eq!(snapshot.last_error, None);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_now_skips_the_wait() {
        let (source, calls) = scripted(0);
        let handle = RequestPoller::new(source, PollerConfig::from_seconds(3600)).spawn();
        let mut updates = handle.subscribe();
        updates.wait_for(|s| s.refreshed_at.is_some()).await.unwrap();

        handle.refresh_now();
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_polling() {
        let (source, calls) = scripted(0);
        let handle = RequestPoller::new(source, PollerConfig::from_seconds(30)).spawn();
        let mut updates = handle.subscribe();
        updates.wait_for(|s| s.refreshed_at.is_some()).await.unwrap();

        handle.cancel();
        let after_cancel = calls.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(calls.load(Ordering::SeqCst), after_cancel);
    }
}
