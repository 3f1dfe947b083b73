//! Optional GUI forwarding socket.
//!
//! Each completed SPDU is mirrored to a local GUI process as a small packed
//! datagram. Forwarding is best-effort: a GUI that is not listening must
//! never stall or fail the receiver.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

use crate::types::Bsm;

pub const TKGUI_PORT: u16 = 9999;
pub const WEBGUI_PORT: u16 = 8888;

/// Wire length of one GUI update: five f32 fields, three flag bytes, and
/// the vehicle id as f32.
pub const GUI_UPDATE_BYTES: usize = 27;

/// Which GUI, if any, receives completed SPDUs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuiMode {
    Tk,
    Web,
    None,
}

impl GuiMode {
    pub fn port(&self) -> Option<u16> {
        match self {
            GuiMode::Tk => Some(TKGUI_PORT),
            GuiMode::Web => Some(WEBGUI_PORT),
            GuiMode::None => None,
        }
    }
}

/// Little-endian packed GUI record mirroring the BSM plus the verdict.
pub fn encode_gui_update(bsm: &Bsm, valid: bool, vehicle_id: u8) -> [u8; GUI_UPDATE_BYTES] {
    let mut out = [0u8; GUI_UPDATE_BYTES];
    out[0..4].copy_from_slice(&bsm.latitude.to_le_bytes());
    out[4..8].copy_from_slice(&bsm.longitude.to_le_bytes());
    out[8..12].copy_from_slice(&bsm.elevation.to_le_bytes());
    out[12..16].copy_from_slice(&bsm.speed_kph.to_le_bytes());
    out[16..20].copy_from_slice(&bsm.heading_degrees.to_le_bytes());
    out[20] = valid as u8;
    out[21] = 1; // receiver-attested flag
    out[22] = 7; // GUI message type
    out[23..27].copy_from_slice(&(vehicle_id as f32).to_le_bytes());
    out
}

/// Fire-and-forget sender toward the selected GUI port.
pub struct GuiForwarder {
    socket: UdpSocket,
    target: SocketAddr,
}

impl GuiForwarder {
    /// `None` when no GUI was requested.
    pub fn new(mode: GuiMode) -> io::Result<Option<Self>> {
        let Some(port) = mode.port() else {
            return Ok(None);
        };
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        Ok(Some(Self {
            socket,
            target: SocketAddr::from((Ipv4Addr::LOCALHOST, port)),
        }))
    }

    /// Send one update; errors are swallowed.
    pub fn forward(&self, bsm: &Bsm, valid: bool, vehicle_id: u8) {
        let datagram = encode_gui_update(bsm, valid, vehicle_id);
        let _ = self.socket.send_to(&datagram, self.target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gui_modes_map_to_their_ports() {
        assert_eq!(GuiMode::Tk.port(), Some(TKGUI_PORT));
        assert_eq!(GuiMode::Web.port(), Some(WEBGUI_PORT));
        assert_eq!(GuiMode::None.port(), None);
    }

    #[test]
    fn gui_update_packs_bsm_and_verdict() {
        let bsm = Bsm {
            latitude: 42.0,
            longitude: -77.0,
            elevation: 100.0,
            speed_kph: 30.5,
            heading_degrees: 181.0,
        };
        let update = encode_gui_update(&bsm, true, 3);
        assert_eq!(f32::from_le_bytes(update[0..4].try_into().unwrap()), 42.0);
        assert_eq!(update[20], 1);
        assert_eq!(update[22], 7);
        assert_eq!(f32::from_le_bytes(update[23..27].try_into().unwrap()), 3.0);

        let update = encode_gui_update(&bsm, false, 3);
        assert_eq!(update[20], 0);
    }
}
