//! Media resolution
//!
//! Turns a link into structured metadata and downloaded artifacts:
//! - [`Platform`] detection and [`clean_url`]
//! - [`MediaResolver`] trait with the yt-dlp implementation [`YtDlpResolver`]
//! - [`select_offers`] picks the variants shown to the user
//! - [`FailureKind`] classifies tool failures for user-facing messages
//! - [`run_preflight`] checks external tools at startup

mod failure;
mod models;
mod offers;
mod platform;
mod preflight;
mod resolver;
mod ytdlp;

pub use failure::FailureKind;
pub use models::{FormatSelection, MediaFormat, MediaKind, ResolvedMedia};
pub use offers::{Offer, Offers, select_offers};
pub use platform::{Platform, clean_url, looks_like_url};
pub use preflight::{PreflightError, ToolReport, existing_cookies, run_preflight};
pub use resolver::{DownloadRequest, MediaResolver, ResolverError};
pub use ytdlp::{YtDlpResolver, parse_info};
