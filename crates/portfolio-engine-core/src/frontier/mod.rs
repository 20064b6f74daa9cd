pub mod efficient_frontier;

pub use efficient_frontier::{efficient_frontier, FrontierInput, FrontierOutput, FrontierPoint};
