//! Pipeline stages used by the submission orchestrator.
//!
//! Each submodule implements one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ render ──▶ encode ──▶ analyze ──▶ postprocess ──▶ feedback::parse
//! (path/URL) (pdfium)   (PNG)     (VLM)       (cleanup)
//! ```
//!
//! 1. [`input`]: read a local file or download a URL into bytes
//! 2. [`render`]: rasterise the first page; runs in `spawn_blocking`
//!    because pdfium is not async-safe
//! 3. [`encode`]: PNG-encode the page, and base64-wrap it for requests
//! 4. [`analyze`]: the analysis endpoint contract and its vision binding;
//!    the only stage that talks to a model
//! 5. [`postprocess`]: strip fences and invisible characters from the
//!    model's answer

pub mod analyze;
pub mod encode;
pub mod input;
pub mod postprocess;
pub mod render;
