pub mod simulation;

pub use simulation::{simulate, McPercentiles, SimulationInput, SimulationOutput};
