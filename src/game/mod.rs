// Game rules: pure, store-free logic invoked by the engine.

pub mod deaths;
pub mod night;
pub mod roles;
pub mod view;
pub mod voice;
pub mod votes;
pub mod wins;

pub use deaths::{DeathOutcome, PendingDeath};
pub use night::NightActionResults;
pub use view::{PlayerView, SessionStateView, SessionView};
pub use votes::{LynchTally, TallyOutcome};
pub use wins::WinCondition;
