pub mod alert;
pub mod button;
pub mod input;
pub mod separator;
pub mod spinner;

// Re-export component symbols so callers can `use crate::components::ui::Button` etc.
pub use alert::*;
pub use button::*;
pub use input::*;
pub use separator::*;
pub use spinner::*;
