//! BH1750 ambient light sensor.
//!
//! The device measures in one of two mutually exclusive ways, chosen once
//! per deployment through [`LightMode`]:
//!
//! - `Continuous`: measuring is switched on at init and the latest result is
//!   simply read back.
//! - `OneShot`: each read triggers a single conversion and waits for it; the
//!   device powers down in between.

use embedded_hal_async::delay::DelayNs;
use embedded_hal_async::i2c::I2c;

use crate::error::SensorError;

/// 7-bit bus address (ADDR pin low).
pub const ADDRESS: u8 = 0x23;

const POWER_ON: u8 = 0x01;
const CONTINUOUS_HIGH_RES: u8 = 0x10;
const ONE_TIME_HIGH_RES: u8 = 0x20;

const SETTLE_MS: u32 = 10;
const ONE_SHOT_CONVERSION_MS: u32 = 180;

const FRAME_LEN: usize = 2;
const COUNTS_PER_LUX: f32 = 1.2;

/// Measurement mode of the light sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LightMode {
    /// Continuous high-resolution measurement, no per-read trigger.
    #[default]
    Continuous,
    /// One conversion per read, 180 ms each.
    OneShot,
}

/// Converts a big-endian measurement frame to lux.
pub fn lux_from_raw(buf: &[u8]) -> Result<f32, SensorError> {
    match buf {
        [hi, lo, ..] => Ok(f32::from(u16::from_be_bytes([*hi, *lo])) / COUNTS_PER_LUX),
        _ => Err(SensorError::ShortRead {
            expected: FRAME_LEN,
            actual: buf.len(),
        }),
    }
}

pub struct Bh1750<I2C, D> {
    i2c: I2C,
    delay: D,
    mode: LightMode,
}

impl<I2C, D> Bh1750<I2C, D>
where
    I2C: I2c,
    D: DelayNs,
{
    pub fn new(i2c: I2C, delay: D, mode: LightMode) -> Self {
        Self { i2c, delay, mode }
    }

    pub fn mode(&self) -> LightMode {
        self.mode
    }

    /// Powers the device on and, in continuous mode, starts measuring.
    ///
    /// The writes are not acknowledged back to the caller: a device that is
    /// missing shows up as failed reads later on.
    pub async fn init(&mut self) {
        self.command(POWER_ON).await;
        self.delay.delay_ms(SETTLE_MS).await;

        if self.mode == LightMode::Continuous {
            self.command(CONTINUOUS_HIGH_RES).await;
            self.delay.delay_ms(SETTLE_MS).await;
        }
    }

    /// Reads the current illuminance in lux.
    pub async fn read(&mut self) -> Result<f32, SensorError> {
        if self.mode == LightMode::OneShot {
            self.i2c
                .write(ADDRESS, &[ONE_TIME_HIGH_RES])
                .await
                .map_err(SensorError::bus)?;
            self.delay.delay_ms(ONE_SHOT_CONVERSION_MS).await;
        }

        let mut frame = [0u8; FRAME_LEN];
        self.i2c
            .read(ADDRESS, &mut frame)
            .await
            .map_err(SensorError::bus)?;
        lux_from_raw(&frame)
    }

    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }

    async fn command(&mut self, opcode: u8) {
        if let Err(e) = self.i2c.write(ADDRESS, &[opcode]).await {
            warn!("bh1750: opcode {} not acknowledged: {:?}", opcode, SensorError::bus(e));
        }
    }
}
