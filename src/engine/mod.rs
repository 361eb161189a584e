// =============================================================================
// Trailing-stop engines
// =============================================================================
//
// Two mutually exclusive stop styles, selected by configuration:
//
//   internal     — the stop exists only in memory; on breach the position is
//                  flattened at market.
//   traditional  — the stop is a real resting stop-market order at the venue,
//                  moved by cancel-then-resubmit.
// =============================================================================

pub mod internal;
pub mod traditional;
