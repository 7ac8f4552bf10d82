//! Heuristic text classifiers. Pure functions; a wrong guess only costs
//! filter quality, so every path returns a usable answer.

pub mod country;
pub mod funding;
