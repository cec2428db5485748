//! EDINET registry access.
//!
//! This module provides access to the EDINET disclosure system including:
//! - Daily document listings narrowed to periodic reports
//! - Submission archive download and XBRL instance extraction
//! - The EDINET code list used to build the issuer directory
//!
//! # Example
//!
//! ```no_run
//! use chrono::NaiveDate;
//! use yuho_data::edinet::EdinetClient;
//! use yuho_data::registry::FilingRegistry;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = EdinetClient::new(std::env::var("EDINET_API_KEY").ok())?;
//!     let day = NaiveDate::from_ymd_opt(2024, 6, 18).unwrap();
//!     let filings = client.list_filings("E02144", day, day).await?;
//!     println!("Found {} periodic reports", filings.len());
//!
//!     let codes = client.fetch_code_list().await?;
//!     println!("{} issuers in the code list", codes.len());
//!     Ok(())
//! }
//! ```

pub mod client;
pub mod codelist;
pub mod documents;

pub use client::{EdinetClient, extract_xbrl_instance};
pub use codelist::CodeList;
pub use documents::{DocType, DocumentEntry, DocumentList, FilingSummary, ListMetadata};
