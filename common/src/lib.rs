pub mod button;
pub mod clock;
pub mod command;
pub mod config;
pub mod cooldown;
pub mod dispatch;
pub mod display;
pub mod opener;
pub mod signer;

pub use button::ButtonState;
pub use clock::{is_time_synced, wait_for_time_sync, SystemClock, WallClock};
pub use command::{CommandBody, LockCommand};
pub use config::{ApiConfig, ButtonConfig, DisplayConfig, OpenerConfig, TimingConfig, TlsMode};
pub use cooldown::CooldownTimer;
pub use dispatch::{
    CommandTransport, DispatchError, Dispatcher, LinkStatus, TransportError, TransportResponse,
};
pub use display::{LockDisplayState, StatusColor, StatusFrame};
pub use opener::{OpenerEngine, TickOutcome, Uplink};
pub use signer::{Nonce, SignedRequest};
