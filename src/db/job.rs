//! Job handle storage
//!
//! One row per submission attempt. Failed attempts are kept (with no scheduler id) so they can
//! be inspected later; submitted jobs are looked up by their scheduler id.

pub mod load;
pub mod update;
