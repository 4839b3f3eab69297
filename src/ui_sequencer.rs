//! UI event sequencer: stamps already-classified page events and appends them to the UI flow.

use std::sync::Arc;

use chrono::Utc;
use flowtap_flow_store::{InitialScreenRecord, Screenshot, UiFlow, UiRecord, UiStepRecord};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::debug;

use crate::metrics;

/// A UI action as classified by the page instrumentation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UiEvent {
    pub event: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub element: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub text: String,
    #[serde(default, deserialize_with = "empty_if_null")]
    pub route: String,
}

fn empty_if_null<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

pub struct UiEventSequencer {
    flow: Arc<UiFlow>,
}

impl UiEventSequencer {
    pub fn new(flow: Arc<UiFlow>) -> Self {
        Self { flow }
    }

    pub fn flow(&self) -> &Arc<UiFlow> {
        &self.flow
    }

    pub fn generation(&self) -> u64 {
        self.flow.generation()
    }

    /// Reset the flow and append the initial-screen record as step 1.
    ///
    /// The record is appended whether or not a screenshot could be taken. Returns the new
    /// generation.
    pub fn begin(&self, route: String, screenshot: Option<Screenshot>) -> u64 {
        let generation = self.flow.reset();
        self.flow.append_next(|step| {
            UiRecord::InitialScreen(InitialScreenRecord {
                step,
                route,
                timestamp: Utc::now(),
                screenshot,
            })
        });
        metrics::record_ui_record();
        debug!(target: "flowtap::ui", generation, "initial screen recorded");
        generation
    }

    /// Append `event` with the next step, in receipt order.
    ///
    /// Returns `None` when the flow was restarted since `generation` was read.
    pub fn record(
        &self,
        generation: u64,
        event: UiEvent,
        screenshot: Option<Screenshot>,
    ) -> Option<u64> {
        let kind = event.event.clone();
        let step = self.flow.append_next_in(generation, |step| {
            UiRecord::Step(UiStepRecord {
                step,
                event: event.event,
                element: event.element,
                text: event.text,
                route: event.route,
                timestamp: Utc::now(),
                screenshot,
            })
        });
        match step {
            Some(step) => {
                metrics::record_ui_record();
                debug!(target: "flowtap::ui", step, event = %kind, "ui step recorded");
            }
            None => debug!(target: "flowtap::ui", event = %kind, "ui flow restarted; event dropped"),
        }
        step
    }
}
