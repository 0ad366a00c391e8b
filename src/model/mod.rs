//! USB data model types.

pub mod bandwidth;
pub mod device;
pub mod endpoint;
pub mod speed;

pub use bandwidth::{SlotUsage, format_load};
pub use device::DeviceContext;
pub use endpoint::{Direction, EndpointDescriptor, EndpointId, TransferType};
pub use speed::{HS_BW_BOUNDARY, SS_BW_BOUNDARY, UsbSpeed};
