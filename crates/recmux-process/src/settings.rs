use recmux_frame::Message;

use crate::error::{ProcessError, Result};

pub const MIN_BEAM: u32 = 1;
pub const MAX_BEAM: u32 = 300;
pub const MIN_LMSCALE: u32 = 1;
pub const MAX_LMSCALE: u32 = 100;

/// Setting name carried in the decoder-setting payload for the beam width.
pub const BEAM_SETTING: &str = "beam";
/// Setting name carried in the decoder-setting payload for the LM scale.
pub const LMSCALE_SETTING: &str = "lm_scale";

/// Validated decoder parameters sent to the recognizer on startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderSettings {
    beam: u32,
    lmscale: u32,
}

impl DecoderSettings {
    /// Validate both values.
    pub fn new(beam: u32, lmscale: u32) -> Result<Self> {
        Ok(Self {
            beam: validate_beam(beam)?,
            lmscale: validate_lmscale(lmscale)?,
        })
    }

    pub fn beam(&self) -> u32 {
        self.beam
    }

    pub fn lmscale(&self) -> u32 {
        self.lmscale
    }

    pub fn set_beam(&mut self, beam: u32) -> Result<()> {
        self.beam = validate_beam(beam)?;
        Ok(())
    }

    pub fn set_lmscale(&mut self, lmscale: u32) -> Result<()> {
        self.lmscale = validate_lmscale(lmscale)?;
        Ok(())
    }

    /// The handshake: urgent `beam` then `lm_scale` setting messages.
    pub fn messages(&self) -> [Message; 2] {
        [
            Message::decoder_setting(BEAM_SETTING, self.beam),
            Message::decoder_setting(LMSCALE_SETTING, self.lmscale),
        ]
    }
}

pub fn validate_beam(beam: u32) -> Result<u32> {
    check_range(BEAM_SETTING, beam, MIN_BEAM, MAX_BEAM)
}

pub fn validate_lmscale(lmscale: u32) -> Result<u32> {
    check_range(LMSCALE_SETTING, lmscale, MIN_LMSCALE, MAX_LMSCALE)
}

fn check_range(name: &'static str, value: u32, min: u32, max: u32) -> Result<u32> {
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ProcessError::OutOfRange {
            name,
            value,
            min,
            max,
        })
    }
}

#[cfg(test)]
mod tests {
    use recmux_frame::MessageType;

    use super::*;

    #[test]
    fn test_beam_bounds() {
        assert!(validate_beam(0).is_err());
        assert!(validate_beam(301).is_err());
        assert_eq!(validate_beam(1).unwrap(), 1);
        assert_eq!(validate_beam(300).unwrap(), 300);
    }

    #[test]
    fn test_lmscale_bounds() {
        assert!(validate_lmscale(0).is_err());
        assert!(validate_lmscale(101).is_err());
        assert_eq!(validate_lmscale(1).unwrap(), 1);
        assert_eq!(validate_lmscale(100).unwrap(), 100);
    }

    #[test]
    fn test_failed_set_keeps_value() {
        let mut settings = DecoderSettings::new(15, 30).unwrap();
        assert!(settings.set_beam(301).is_err());
        assert!(settings.set_lmscale(0).is_err());
        assert_eq!(settings.beam(), 15);
        assert_eq!(settings.lmscale(), 30);
    }

    #[test]
    fn test_out_of_range_message() {
        let err = DecoderSettings::new(0, 30).unwrap_err();
        assert_eq!(err.to_string(), "beam value 0 is not in range 1-300");
    }

    #[test]
    fn test_handshake_messages() {
        let [beam, lmscale] = DecoderSettings::new(15, 30).unwrap().messages();
        for msg in [&beam, &lmscale] {
            assert_eq!(msg.message_type(), Some(MessageType::DecoderSetting));
            assert!(msg.urgent());
        }
        assert_eq!(beam.data_as_string(), "beam 15");
        assert_eq!(lmscale.data_as_string(), "lm_scale 30");
    }
}
