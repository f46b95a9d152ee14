/// LiveScan Core — tracking of acquisition files while they are written.
///
/// This crate contains all tracking logic with no transport or UI
/// dependencies. Data access and messaging sit behind traits so the same
/// logic runs against a remote data server, local files, or in-memory
/// fixtures.
///
/// # Modules
///
/// - [`model`] — Arena-allocated hierarchical data tree.
/// - [`source`] — Tree, dataset, and axes traits plus JSON and in-memory sources.
/// - [`classify`] — Dataset discovery and classification rules.
/// - [`view`] — `LiveView`: a file's classified datasets, refreshed as it grows.
/// - [`scheduler`] — Single worker running durable and droppable refresh jobs.
/// - [`router`] — Scan and processing lifecycle events mapped onto views.
/// - [`config`] — Tracker configuration.
/// - [`error`] — Error types.
pub mod classify;
pub mod config;
pub mod error;
pub mod model;
pub mod router;
pub mod scheduler;
pub mod source;
pub mod view;
