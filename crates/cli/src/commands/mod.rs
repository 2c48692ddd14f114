pub(crate) mod check_config;
pub(crate) mod replay;
