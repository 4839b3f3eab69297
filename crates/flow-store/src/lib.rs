//! Flow storage for FlowTap.
//!
//! A flow is the ordered, append-only sequence of finalized records for one recording mode. The
//! network flow holds [`NetworkRecord`]s, the UI flow holds [`UiRecord`]s; both serialize into the
//! tagged [`FlowRecord`] schema consumed by the external viewer.

pub mod errors;
pub mod export;
pub mod model;
pub mod store;

pub use errors::FlowStoreError;
pub use export::{from_json, read_flow_file, to_json_pretty, write_flow_file};
pub use model::{
    BodyEncoding, FlowRecord, Headers, InitialScreenRecord, NetworkRecord, RequestMeta,
    ResponseMeta, Screenshot, Stepped, UiRecord, UiStepRecord,
};
pub use store::{FlowStore, StepReservation};

/// Flow of finalized network records.
pub type NetworkFlow = FlowStore<NetworkRecord>;

/// Flow of UI interaction records.
pub type UiFlow = FlowStore<UiRecord>;
