pub use switchboard_common::{Error, Result};

switchboard_common::impl_context!();
