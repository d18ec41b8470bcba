mod store;
mod writer;

pub use store::{
    get_application, get_directory, get_file, get_header, new_directory_writer, new_file_writer,
    put_application, put_header, store_file, DirectoryWriter, ObjectFile,
};
pub use writer::{MemoryWriter, ObjectSink, ObjectWriter, TempRef};
