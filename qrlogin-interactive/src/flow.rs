//! Message-type tags per login flow.
//!
//! The two flows run the same steps and differ only in the tags this device
//! puts on its own messages, so the orchestrator looks them up here and never
//! branches on the flow itself. Incoming messages are judged by their fields,
//! not their tags.

use qrlogin_lib::LoginFlow;

use crate::payload::PayloadType;

/// Tags of the messages the new device sends.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowTags {
    /// Our choice of protocol.
    pub protocol_reply: PayloadType,
    /// Our signed-in device announcement.
    pub device_confirmation: PayloadType,
}

const SETUP_ADDITIONAL_DEVICE_V1: FlowTags = FlowTags {
    protocol_reply: PayloadType::Progress,
    device_confirmation: PayloadType::Progress,
};

const DEFAULT: FlowTags = FlowTags {
    protocol_reply: PayloadType::Protocol,
    device_confirmation: PayloadType::Success,
};

impl FlowTags {
    pub fn for_flow(flow: LoginFlow) -> &'static FlowTags {
        match flow {
            LoginFlow::SetupAdditionalDeviceV1 => &SETUP_ADDITIONAL_DEVICE_V1,
            LoginFlow::Default => &DEFAULT,
        }
    }
}
