//! Renderings of a run's data.
//!
//! # Submodules
//!
//! - [`brief`]: the plain-text brief sent to the summarizer, and its inverse split
//! - [`candidates`]: numbered candidate list for topic selection
//! - [`html`]: Markdown → HTML for email bodies
//! - [`json`]: dated JSON archive of digest runs

pub mod brief;
pub mod candidates;
pub mod html;
pub mod json;
