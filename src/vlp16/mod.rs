//! VLP-16 data packet decoding
//!
//! Each data packet holds 12 blocks of 32 channel returns, two firing
//! sequences of the 16 lasers per block. Azimuth is reported once per block
//! and interpolated for every point using the firing schedule in `timing`.
mod azimuth;
mod calib;
mod decoder;
mod timing;

pub use self::azimuth::{Sweep, point_azimuth};
pub use self::calib::elevation;
pub use self::decoder::{decode, decode_frame, decode_data_frame, PACKET_POINTS};
pub use self::timing::{
    TimeOffsetTable, FIRING_CYCLE_US, FIRING_STEP_US, BLOCK_PERIOD_US,
};
