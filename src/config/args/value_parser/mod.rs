pub mod file_exist;
pub mod url;
