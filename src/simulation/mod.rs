// Simulation — seeded synthetic traffic for both flows, plus a stand-in
// inference model so the content pipeline can run without a network.

pub mod chat;
pub mod content;

pub use chat::ChatConfig;
pub use content::{ContentGenerator, Scenario, SimulatedModel};
