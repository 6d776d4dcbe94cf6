pub mod issue;
pub mod relay;
pub mod scan;
pub mod status;
pub mod sweep;
