mod ingest;
mod verify;

pub use ingest::{
    store_and_tag, store_application, store_application_with, store_directory,
    store_directory_with,
};
pub use verify::{check_rollups, list_objects, verify, VerifyReport};
