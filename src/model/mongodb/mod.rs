mod collection;
mod counter;
mod errors;

pub use collection::{ensure_indexes_exist, Coll, MongoCollection, WindowSetting};
pub use counter::{ensure_counter_exists, Counter, CANDIDATE_SEQ_COUNTER_ID};
pub use errors::is_duplicate_key_error;
