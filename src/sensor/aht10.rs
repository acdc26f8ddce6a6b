//! AHT10 temperature and humidity sensor.
//!
//! Every measurement is a fixed exchange: write the trigger command, wait
//! for the conversion, read a 6-byte frame. The frame packs a status byte
//! followed by two 20-bit values:
//!
//! ```text
//! byte  0        1        2        3        4        5
//!       status   HHHHHHHH HHHHHHHH HHHHTTTT TTTTTTTT TTTTTTTT
//! ```

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::error::SensorError;

/// 7-bit bus address.
pub const ADDRESS: u8 = 0x38;

const CMD_INIT: [u8; 3] = [0xE1, 0x08, 0x00];
const CMD_MEASURE: [u8; 3] = [0xAC, 0x33, 0x00];

const INIT_SETTLE_MS: u32 = 20;
// datasheet conversion time is ~75 ms
const CONVERSION_MS: u32 = 80;

const FRAME_LEN: usize = 6;
const STATUS_MASK: u8 = 0x88; // busy | calibrated
const STATUS_READY: u8 = 0x08; // idle and calibrated
const FULL_SCALE: f32 = 1_048_576.0; // 2^20

/// One temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Climate {
    /// Degrees Celsius.
    pub temperature: f32,
    /// Relative humidity, percent.
    pub humidity: f32,
}

impl Climate {
    /// Decodes a measurement frame.
    ///
    /// Fails on frames shorter than 6 bytes and on any status byte that is
    /// not "idle and calibrated"; the remaining bytes are not looked at in
    /// either case.
    pub fn decode(buf: &[u8]) -> Result<Self, SensorError> {
        let Some(frame) = buf.get(..FRAME_LEN) else {
            return Err(SensorError::ShortRead {
                expected: FRAME_LEN,
                actual: buf.len(),
            });
        };

        let status = frame[0];
        if status & STATUS_MASK != STATUS_READY {
            return Err(SensorError::NotReady { status });
        }

        let raw_humidity =
            (u32::from(frame[1]) << 12) | (u32::from(frame[2]) << 4) | (u32::from(frame[3]) >> 4);
        let raw_temperature =
            ((u32::from(frame[3]) & 0x0F) << 16) | (u32::from(frame[4]) << 8) | u32::from(frame[5]);

        Ok(Self {
            humidity: (raw_humidity as f32 / FULL_SCALE) * 100.0,
            temperature: (raw_temperature as f32 / FULL_SCALE) * 200.0 - 50.0,
        })
    }
}

/// AHT10 driver. Owns its bus handle and a delay provider.
pub struct Aht10<I2C, D> {
    i2c: I2C,
    delay: D,
}

impl<I2C, D> Aht10<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self { i2c, delay }
    }

    /// Sends the initialisation (calibration) command.
    ///
    /// Fails only if the device does not acknowledge the write.
    pub async fn init(&mut self) -> Result<(), SensorError> {
        self.i2c
            .write(ADDRESS, &CMD_INIT)
            .await
            .map_err(SensorError::bus)?;
        self.delay.delay_ms(INIT_SETTLE_MS).await;
        Ok(())
    }

    /// Triggers a measurement and decodes the result.
    pub async fn read(&mut self) -> Result<Climate, SensorError> {
        self.i2c
            .write(ADDRESS, &CMD_MEASURE)
            .await
            .map_err(SensorError::bus)?;
        self.delay.delay_ms(CONVERSION_MS).await;

        let mut frame = [0u8; FRAME_LEN];
        self.i2c
            .read(ADDRESS, &mut frame)
            .await
            .map_err(SensorError::bus)?;
        Climate::decode(&frame)
    }

    /// Gives the bus and delay back.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}
