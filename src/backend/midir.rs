use super::Synth;
use crate::{error::SendError, event::PitchBend, prelude::*};
use ::midir::{MidiOutput, MidiOutputConnection};

/// Sends every message to a MIDI output port.
pub struct MidiOutSynth {
    conn: MidiOutputConnection,
}
impl MidiOutSynth {
    pub fn new(conn: MidiOutputConnection) -> MidiOutSynth {
        MidiOutSynth { conn }
    }

    /// Connect to the first output port whose name contains `port_name`.
    pub fn connect(client_name: &str, port_name: &str) -> StdResult<MidiOutSynth, SendError> {
        let output =
            MidiOutput::new(client_name).map_err(|err| SendError::Device(err.to_string()))?;
        let port = output
            .ports()
            .into_iter()
            .find(|port| {
                output
                    .port_name(port)
                    .map(|name| name.contains(port_name))
                    .unwrap_or(false)
            })
            .ok_or_else(|| {
                SendError::Device(format!("no midi output port matching {:?}", port_name))
            })?;
        let conn = output
            .connect(&port, client_name)
            .map_err(|err| SendError::Device(err.to_string()))?;
        tracing::debug!(port_name, "connected midi output");
        Ok(MidiOutSynth { conn })
    }

    fn send(&mut self, bytes: &[u8]) -> StdResult<(), SendError> {
        self.conn
            .send(bytes)
            .map_err(|err| SendError::Device(err.to_string()))
    }
}
impl Synth for MidiOutSynth {
    fn note_on(&mut self, channel: u4, key: u7, velocity: u7) -> StdResult<(), SendError> {
        self.send(&[0x90 | channel.as_int(), key.as_int(), velocity.as_int()])
    }
    fn note_off(&mut self, channel: u4, key: u7) -> StdResult<(), SendError> {
        self.send(&[0x80 | channel.as_int(), key.as_int(), 0])
    }
    fn program_change(&mut self, channel: u4, program: u7) -> StdResult<(), SendError> {
        self.send(&[0xC0 | channel.as_int(), program.as_int()])
    }
    fn pitch_bend(&mut self, channel: u4, bend: PitchBend) -> StdResult<(), SendError> {
        let raw = bend.raw();
        self.send(&[0xE0 | channel.as_int(), (raw & 0x7F) as u8, (raw >> 7) as u8])
    }
}
