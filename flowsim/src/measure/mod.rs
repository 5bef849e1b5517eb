mod bandwidth;
mod latency;
mod packet_loss;

pub use self::{
    bandwidth::Bandwidth,
    latency::Latency,
    packet_loss::{LossRate, LossRateError, PacketLoss, PacketLossParseError},
};
