// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators feeding the
// DEMA±ATR trail mode. Each works on plain slices and returns `Option` when
// the input is too short or broken.
// =============================================================================

pub mod atr;
pub mod dema;
