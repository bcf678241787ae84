pub mod blob_record;
