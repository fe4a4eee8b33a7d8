use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, Mutex};

use crate::{
    api::{self, flow::fetch_window, ApiTransport},
    db::{HistoryStore, MergeOutcome},
    detection,
    error::Result,
    log_error, log_info, log_warn,
    models::{Credentials, HistoryTable, Session},
    parsing::parse_flow_response,
    settings::MonitorSettings,
    utils::FetchWindow,
};

const ENABLE_LOGS: bool = true;

/// Runs the auth, fetch, parse, detect and merge pipeline and publishes the resulting table.
///
/// Readers get immutable [`HistoryTable`] snapshots through [`FlowMonitor::history`] or a
/// [`watch`] subscription; nothing outside this type mutates stored records.
#[derive(Clone)]
pub struct FlowMonitor {
    settings: Arc<MonitorSettings>,
    credentials: Arc<Credentials>,
    transport: Arc<dyn ApiTransport>,
    session: Arc<Mutex<Option<Session>>>,
    store: HistoryStore,
    snapshot: Arc<watch::Sender<HistoryTable>>,
    refresh_lock: Arc<Mutex<()>>,
}

impl FlowMonitor {
    pub async fn open(
        settings: MonitorSettings,
        credentials: Credentials,
        transport: Arc<dyn ApiTransport>,
    ) -> Result<Self> {
        settings.validate()?;

        let store = HistoryStore::new(settings.history_path.clone())?;
        let initial = store.load().await?;
        log_info!(
            "Loaded {} stored records from {}",
            initial.len(),
            store.path().display()
        );

        let (snapshot, _) = watch::channel(initial);

        Ok(Self {
            settings: Arc::new(settings),
            credentials: Arc::new(credentials),
            transport,
            session: Arc::new(Mutex::new(None)),
            store,
            snapshot: Arc::new(snapshot),
            refresh_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn store(&self) -> &HistoryStore {
        &self.store
    }

    /// Latest published table.
    pub fn history(&self) -> HistoryTable {
        self.snapshot.borrow().clone()
    }

    /// Receiver that changes after every successful refresh.
    pub fn subscribe(&self) -> watch::Receiver<HistoryTable> {
        self.snapshot.subscribe()
    }

    /// Authenticate now and keep the session for later fetches.
    pub async fn authenticate(&self) -> Result<Session> {
        let session = api::authenticate(
            self.transport.as_ref(),
            &self.settings.api,
            &self.credentials.username,
            &self.credentials.password,
        )
        .await?;
        *self.session.lock().await = Some(session.clone());
        Ok(session)
    }

    /// Refresh over the default window: start of this year to end of this month.
    pub async fn refresh(&self) -> Result<HistoryTable> {
        self.refresh_range(None, None).await
    }

    pub async fn refresh_range(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<HistoryTable> {
        let _guard = self.refresh_lock.lock().await;

        match self.run_pipeline(start, end).await {
            Ok(outcome) => {
                let table = outcome.table;
                self.snapshot.send_replace(table.clone());
                Ok(table)
            }
            Err(err) => {
                log_error!("Refresh failed, keeping previous history: {err}");
                Err(err)
            }
        }
    }

    async fn run_pipeline(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<MergeOutcome> {
        let window = FetchWindow::resolve(start, end, Utc::now().date_naive())?;
        let session = self.valid_session().await?;

        let raw = fetch_window(
            self.transport.as_ref(),
            &self.settings.api,
            &session,
            self.credentials.controller_id,
            &window,
        )
        .await?;

        let parsed = parse_flow_response(&raw, self.settings.rejection_policy)?;
        if !parsed.rejected.is_empty() {
            log_warn!("{} readings were rejected while parsing", parsed.rejected.len());
        }

        let records = detection::detect(parsed.readings, &self.settings.detection);
        self.store.merge(records).await
    }

    async fn valid_session(&self) -> Result<Session> {
        {
            let guard = self.session.lock().await;
            if let Some(session) = guard.as_ref().filter(|s| !s.is_expired()) {
                return Ok(session.clone());
            }
        }

        log_info!("No valid session, authenticating");
        self.authenticate().await
    }
}
