pub mod modification;
pub mod platform;
pub mod station;
pub mod tips;
pub mod train;
pub mod wing;

pub use modification::{Modification, ModificationKind};
pub use platform::Platform;
pub use station::Station;
pub use tips::{BoardingTip, TransferTip, TravelTip};
pub use train::{Train, TransportKind, STATUS_DEPARTED};
pub use wing::{RollingStockUnit, Wing};
