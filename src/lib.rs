//! # geotitle
//!
//! Geotag JPEG photos from the place name in their filenames, give them a
//! short AI-generated title, and fix GPS coordinates by hand.
//!
//! ## Batch run
//!
//! For every `.jpg`/`.jpeg` in a folder that is not yet in the folder's
//! `log.csv` ledger:
//!
//! 1. Strip digits from the filename and geocode what is left (`Paris01.jpg` → "Paris").
//! 2. Write GPS EXIF tags, unless the file already has them.
//! 3. Ask a vision model for a title.
//! 4. Rename the file (and any same-stem sidecars) to the title.
//! 5. Append `original,new title` to the ledger.
//!
//! ```rust,no_run
//! use geotitle::config::Config;
//! use geotitle::pipeline::BatchPipeline;
//! use geotitle::status::{status_channel, CancelFlag, StatusEvent};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::load(Some("config.json".as_ref()))?;
//!     config.apply_env();
//!
//!     let pipeline = BatchPipeline::from_config(&config)?;
//!     let (tx, mut rx) = status_channel();
//!     let cancel = CancelFlag::new();
//!
//!     let summary = pipeline.run("./photos".as_ref(), &tx, &cancel).await?;
//!     drop(tx);
//!
//!     while let Some(event) = rx.recv().await {
//!         if let StatusEvent::File(report) = event {
//!             println!("{} -> {:?}", report.original, report.new_name);
//!         }
//!     }
//!     println!("{} processed, {} failed", summary.processed, summary.failed);
//!     Ok(())
//! }
//! ```
//!
//! ## Manual GPS editing
//!
//! ```rust,no_run
//! use geotitle::editor::{Advance, EditorSession};
//!
//! # fn main() -> anyhow::Result<()> {
//! let mut session = EditorSession::load_folder("./photos".as_ref())?;
//! while let Some(current) = session.load_current()? {
//!     println!("{} ({}/{})", current.file_name, current.position, current.total);
//!     if session.save_current_and_advance("48.8566", "2.3522")? == Advance::EndOfList {
//!         break;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`exif`]: GPS EXIF reading and writing, with the shared DMS codec
//! - [`geocode`]: Place name → coordinate (Nominatim)
//! - [`ai`]: Image → title (OpenAI)
//! - [`rename`]: Title sanitizing and collision-safe renames
//! - [`ledger`]: The `log.csv` ledger
//! - [`pipeline`]: The batch run
//! - [`editor`]: The manual GPS editor
//! - [`status`]: Status events and cancellation
//! - [`config`]: Configuration loading/saving
//! - [`error`]: Error kinds front ends react to

pub mod ai;
pub mod config;
pub mod editor;
pub mod error;
pub mod exif;
pub mod geocode;
pub mod ledger;
pub mod pipeline;
pub mod rename;
pub mod status;
