use tracing::info;

use super::{LookupError, NavigationAutomaton};
use crate::{
    browser::BrowserLauncher,
    config::PortalConfig,
    domain::{FeeRecord, PatentContext},
    extraction::ExtractionEngine,
    infrastructure::cancel::CancelListener,
    session::SessionStore,
};

/// The portal is queried with digits only, so `CN 2023 1 0123456.7` becomes `2023101234567`.
pub fn query_string(patent_number: &str) -> String {
    patent_number.chars().filter(char::is_ascii_digit).collect()
}

/// One fresh browser context per lookup; nothing browser-side survives between calls.
pub struct FeeLookup<L> {
    launcher: L,
    config: PortalConfig,
    engine: ExtractionEngine,
}

impl<L: BrowserLauncher> FeeLookup<L> {
    pub fn new(launcher: L, config: PortalConfig) -> Self {
        Self {
            launcher,
            config,
            engine: ExtractionEngine::new(),
        }
    }

    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    pub fn engine(&self) -> &ExtractionEngine {
        &self.engine
    }

    /// Fee records due for `patent`, stamped with its metadata.
    ///
    /// The browser is torn down on every path, including cancellation.
    pub async fn lookup_fees(
        &self,
        sessions: &SessionStore,
        patent: &PatentContext,
        headful: bool,
        cancel: &mut CancelListener,
    ) -> Result<Vec<FeeRecord>, LookupError> {
        let query = query_string(&patent.patent_number);
        if query.is_empty() {
            return Err(LookupError::InvalidPatentNumber(
                patent.patent_number.clone(),
            ));
        }
        if cancel.is_triggered() {
            return Err(LookupError::Cancelled);
        }
        let session = sessions.load()?;

        let driver = self
            .launcher
            .launch(Some(&session), headful)
            .await
            .map_err(|source| LookupError::Driver {
                stage: "launch",
                source,
            })?;

        let outcome = {
            let mut automaton = NavigationAutomaton::new(driver.as_ref(), &self.config);
            tokio::select! {
                result = automaton.run(&query, &self.engine) => result,
                _ = cancel.notified() => Err(LookupError::Cancelled),
            }
        };
        driver.close().await;

        let mut records = outcome?;
        for record in &mut records {
            patent.apply(record);
        }
        info!(
            target: "portal",
            patent = %patent.patent_number,
            count = records.len(),
            "fee lookup finished"
        );
        Ok(records)
    }
}
