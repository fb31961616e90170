//! Photo and video uploads for shelter records.
//!
//! Media captured for an animal (intake form, kennel checks, walk sessions) is
//! resized by [`image_processor`], queued in an [`uploader::UploadQueue`],
//! pushed to object storage through a [`storage::StorageClient`] and, once
//! stored, recorded in the [`database`].

pub mod config;
pub mod database;
pub mod errors;
pub mod image_processor;
pub mod models;
pub mod security;
pub mod storage;
pub mod uploader;
