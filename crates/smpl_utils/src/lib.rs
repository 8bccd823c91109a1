pub mod array;
pub mod io;
pub mod numerical;
