//! Pipeline stages for re-hosting spreadsheet images.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own and the unit-of-work can be swapped without touching the batch logic.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌──────────────────── rehost (per row) ────────────────────┐
//! batch ──▶  fetch ──▶ transcode ──▶ upload                             │
//! (order)    (GET)     (decode/RGB/resize/PNG)  (base64 POST → link)     │
//!            └──────────────────────────────────────────────────────────┘
//! ```
//!
//! 1. [`batch`]: bounded fan-out over rows, results reassembled by index
//! 2. [`rehost`]: the [`rehost::UnitOfWork`] seam and its default impl
//! 3. [`fetch`]: download one source URL with a per-call timeout
//! 4. [`transcode`]: CPU-bound image work; run in `spawn_blocking`
//! 5. [`upload`]: POST to the hosting API and parse its JSON answer

pub mod batch;
pub mod fetch;
pub mod rehost;
pub mod transcode;
pub mod upload;
