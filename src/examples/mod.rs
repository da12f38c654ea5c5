//! Worked problems built on the public API. These double as end-to-end
//! tests and as the backing code for the demo binaries under `demos/`.

pub mod magic_square;
pub mod send_more_money;
