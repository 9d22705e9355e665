pub mod utils_time;

pub use utils_time::*;
