mod file_ops;

pub use file_ops::{
    count_entries, count_images, list_images, move_file, remove_file_best_effort, FileOpError,
    FileOpResult,
};
