pub mod fsck;
pub mod util;

// vim:ts=2 sw=2
