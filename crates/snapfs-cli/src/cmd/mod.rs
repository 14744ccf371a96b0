pub(crate) mod cat;
pub(crate) mod ls;
pub(crate) mod serve;
pub(crate) mod snapshots;
pub(crate) mod walk;
