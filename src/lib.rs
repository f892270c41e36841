//! # LIDAR-Lite v4 LED Optical Distance Sensor Driver
//!
//! This crate provides a `no_std` driver for Garmin's LIDAR-Lite v4 LED optical ranging sensor.
//! The blocking flavour is built on `embedded-hal` 1.0; enabling the `async` feature switches the
//! bus and delay traits over to `embedded-hal-async`.
//!
//! The driver speaks to the device through its register map over I2C. The trigger and monitor
//! pins can optionally be used to start a measurement and to watch the busy flag without bus
//! traffic.
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use lidarlite_v4::LidarLite;
//!
//! let mut i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
//! let delay = embedded_hal_mock::eh1::delay::NoopDelay;
//! let mut sensor = LidarLite::new(&mut i2c, delay);
//!
//! if sensor.is_connected() {
//!     sensor.configure(0).unwrap();
//!     let distance_cm = sensor.measure().unwrap();
//!     println!("Distance: {} cm", distance_cm);
//! }
//! ```
//!
//! ## Sharing the bus
//!
//! The driver takes anything implementing [`I2c`](embedded_hal::i2c::I2c), including `&mut` to a
//! bus that outlives it, or a device from `embedded-hal-bus` when several sensors sit on the same
//! bus. Bus arbitration is left to the caller.
#![no_std]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod fmt; // <-- must be first module!

use embedded_hal::digital::{Error as _, InputPin, StatefulOutputPin};
#[cfg(not(feature = "async"))]
use embedded_hal::{delay::DelayNs, i2c::I2c};
#[cfg(feature = "async")]
use embedded_hal_async::{delay::DelayNs, i2c::I2c};

/// Factory I2C address of the device.
pub const DEFAULT_ADDRESS: u8 = 0x62;

/// Lowest 7-bit address the device accepts as a custom address.
pub const MIN_ADDRESS: u8 = 0x08;

/// Highest 7-bit address the device accepts as a custom address.
pub const MAX_ADDRESS: u8 = 0x77;

/// Maximum number of points in a correlation record.
pub const CORRELATION_RECORD_LEN: usize = 192;

/// Number of probes made while waiting for the device to answer on a new address.
pub const ADDRESS_POLL_ATTEMPTS: u32 = 100;

/// Pause before each probe made while waiting for the device to answer on a new address.
pub const ADDRESS_POLL_INTERVAL_MS: u32 = 10;

/// Largest payload accepted by [`LidarLite::write_register`] in one transaction.
pub const MAX_WRITE_LEN: usize = 16;

const CMD_TAKE_RANGE: u8 = 0x04;
const STATUS_BUSY: u8 = 0x01;
const FLASH_ENABLE: u8 = 0x11;
const FLASH_DISABLE: u8 = 0x00;
const FACTORY_RESET_CMD: u8 = 0x01;

/// Register addresses for the LIDAR-Lite v4 LED.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Register {
    /// Device command register (0x00)
    AcqCommands = 0x00,
    /// System status register (0x01)
    Status = 0x01,
    /// Maximum acquisition count register (0x05)
    AcquisitionCount = 0x05,
    /// Distance measurement low byte (0x10)
    FullDelayLow = 0x10,
    /// Distance measurement high byte (0x11)
    FullDelayHigh = 0x11,
    /// Unit ID byte 0, least significant (0x16)
    UnitId0 = 0x16,
    /// Unit ID byte 1 (0x17)
    UnitId1 = 0x17,
    /// Unit ID byte 2 (0x18)
    UnitId2 = 0x18,
    /// Unit ID byte 3, most significant (0x19)
    UnitId3 = 0x19,
    /// Secondary I2C address in use (0x1A)
    I2cSecAddr = 0x1A,
    /// Address response selection (0x1B)
    I2cConfig = 0x1B,
    /// Peak detection threshold bypass (0x1C)
    DetectionSensitivity = 0x1C,
    /// Library version string (0x30)
    LibVersion = 0x30,
    /// Correlation record data point (0x52)
    CorrData = 0x52,
    /// Coprocessor firmware version, low byte (0x72)
    CpVerLo = 0x72,
    /// Board temperature in degrees Celsius (0xE0)
    BoardTemperature = 0xE0,
    /// Board hardware version (0xE1)
    HardwareVersion = 0xE1,
    /// Power state control (0xE2)
    PowerMode = 0xE2,
    /// Delay between automatic measurements (0xE3)
    MeasurementInterval = 0xE3,
    /// Reset default settings (0xE4)
    FactoryReset = 0xE4,
    /// Quick acquisition termination (0xE5)
    QuickTermination = 0xE5,
    /// Start secure bootloader (0xE6)
    StartBootloader = 0xE6,
    /// Non-volatile storage write gate (0xEA)
    EnableFlashStorage = 0xEA,
    /// Improved accuracy by averaging (0xEB)
    HighAccuracyMode = 0xEB,
    /// SoC temperature in degrees Celsius (0xEC)
    SocTemperature = 0xEC,
}

impl From<Register> for u8 {
    fn from(r: Register) -> Self {
        r as u8
    }
}

/// Preset measurement configurations.
///
/// Each preset writes a maximum acquisition count and a quick termination setting.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Profile {
    /// Maximum range, maximum acquisition count
    #[default]
    MaximumRange = 0,
    /// Balanced performance
    Balanced = 1,
    /// Short range, high speed
    ShortRange = 2,
    /// Mid range, higher speed on short range targets
    MidRange = 3,
    /// Maximum range, higher speed on short range targets
    MaximumRangeQuick = 4,
    /// Very short range, high speed, high error
    VeryShortRange = 5,
}

impl Profile {
    /// Register values for this preset: `(acquisition count, quick termination)`.
    #[must_use]
    pub const fn settings(self) -> (u8, u8) {
        match self {
            Profile::MaximumRange => (0xFF, 0x08),
            Profile::Balanced => (0x80, 0x08),
            Profile::ShortRange => (0x18, 0x00),
            Profile::MidRange => (0x80, 0x00),
            Profile::MaximumRangeQuick => (0xFF, 0x00),
            Profile::VeryShortRange => (0x04, 0x00),
        }
    }
}

impl TryFrom<u8> for Profile {
    /// The rejected index.
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Profile::MaximumRange),
            1 => Ok(Profile::Balanced),
            2 => Ok(Profile::ShortRange),
            3 => Ok(Profile::MidRange),
            4 => Ok(Profile::MaximumRangeQuick),
            5 => Ok(Profile::VeryShortRange),
            _ => Err(value),
        }
    }
}

/// Which I2C address(es) the device answers on.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressMode {
    /// Only the factory address (0x62)
    DefaultOnly = 0x00,
    /// Only the custom address
    CustomOnly = 0x01,
    /// Both the factory and the custom address
    Both = 0x02,
}

impl From<AddressMode> for u8 {
    fn from(mode: AddressMode) -> Self {
        mode as u8
    }
}

/// Power state of the device.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PowerMode {
    /// The device sleeps between measurements
    Asynchronous = 0x00,
    /// The device sleeps and wakes on the trigger pin
    Synchronous = 0x01,
    /// The device stays powered (factory setting)
    AlwaysOn = 0xFF,
}

impl From<PowerMode> for u8 {
    fn from(mode: PowerMode) -> Self {
        mode as u8
    }
}

/// Bound on the busy-flag polling done while waiting for a measurement.
///
/// A device that never clears its busy flag ends the wait with [`Error::Timeout`] after
/// `max_attempts` checks instead of blocking forever. The default pauses 100 us after each
/// check, about one second in total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct MeasurementPolling {
    /// Number of busy-flag checks before giving up. Zero fails immediately.
    pub max_attempts: u32,
    /// Pause between two checks, in microseconds. Zero polls back to back.
    pub interval_us: u32,
}

impl Default for MeasurementPolling {
    fn default() -> Self {
        Self {
            max_attempts: 10_000,
            interval_us: 100,
        }
    }
}

/// Step of the address change sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressStep {
    /// The requested address is outside `0x08..=0x77`
    ValidateAddress,
    /// Reading the unit ID used as write key
    ReadUnitId,
    /// Writing the unit ID and the new address
    CommitAddress,
    /// Waiting for the device to answer on its new address
    AwaitAddress,
    /// Selecting which address(es) the device answers on
    SelectAddressMode,
}

/// Detailed failure of an address change.
///
/// [`LidarLite::set_i2c_address`] and [`LidarLite::use_default_address`] only report `error`;
/// the `_detailed` variants also report which step failed.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AddressChangeError<E: core::fmt::Debug> {
    /// Step that failed
    pub step: AddressStep,
    /// Underlying error
    pub error: Error<E>,
}

impl<E: core::fmt::Debug> AddressChangeError<E> {
    fn at(step: AddressStep) -> impl FnOnce(Error<E>) -> Self {
        move |error| Self { step, error }
    }
}

impl<E: core::fmt::Debug> core::fmt::Display for AddressChangeError<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:?} failed: {}", self.step, self.error)
    }
}

/// Builds the address commit payload: the unit ID most significant byte first, then the new
/// address.
fn commit_payload(unit_id: [u8; 4], new_address: u8) -> [u8; 5] {
    let [b0, b1, b2, b3] = unit_id;
    [b3, b2, b1, b0, new_address]
}

fn pin_error<P, E>(error: P) -> Error<E>
where
    P: embedded_hal::digital::Error,
    E: core::fmt::Debug,
{
    Error::PinError(error.kind())
}

/// LIDAR-Lite v4 LED optical distance sensor driver.
///
/// The driver owns the current I2C address of the device and the injected bus and delay
/// implementations. Operations are blocking (or awaited with the `async` feature) and must not be
/// interleaved on the same device.
pub struct LidarLite<I2C, D> {
    /// I2C interface for communication with the sensor
    i2c: I2C,
    /// Address the device is currently expected to answer on
    address: u8,
    /// Delay implementation for the polling loops
    delay: D,
    /// Bound on measurement busy-flag polling
    polling: MeasurementPolling,
}

impl<I2C, D> LidarLite<I2C, D> {
    /// Creates a new driver for a device on the factory address (0x62).
    ///
    /// No bus traffic is generated. Use [`is_connected`](Self::is_connected) or
    /// [`open`](Self::open) to check the device is present.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use lidarlite_v4::LidarLite;
    ///
    /// let i2c = embedded_hal_mock::eh1::i2c::Mock::new(&[]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    ///
    /// let sensor = LidarLite::new(i2c, delay);
    /// assert_eq!(sensor.address(), 0x62);
    /// ```
    pub fn new(i2c: I2C, delay: D) -> Self {
        Self::with_address(i2c, delay, DEFAULT_ADDRESS)
    }

    /// Creates a new driver for a device already answering on `address`.
    pub fn with_address(i2c: I2C, delay: D, address: u8) -> Self {
        Self {
            i2c,
            address,
            delay,
            polling: MeasurementPolling::default(),
        }
    }

    /// Address the driver currently talks to.
    pub fn address(&self) -> u8 {
        self.address
    }

    /// Current bound on measurement busy-flag polling.
    pub fn measurement_polling(&self) -> MeasurementPolling {
        self.polling
    }

    /// Replaces the bound on measurement busy-flag polling.
    pub fn set_measurement_polling(&mut self, polling: MeasurementPolling) {
        self.polling = polling;
    }

    /// Consumes the driver and gives back the bus and the delay.
    pub fn release(self) -> (I2C, D) {
        (self.i2c, self.delay)
    }
}

#[maybe_async_cfg::maybe(
    sync(cfg(not(feature = "async")), keep_self),
    async(feature = "async", keep_self)
)]
impl<I2C, E, D> LidarLite<I2C, D>
where
    I2C: I2c<Error = E>,
    E: core::fmt::Debug,
    D: DelayNs,
{
    /// Points the driver at `address` and checks the device answers there.
    ///
    /// The address is kept even when the device does not answer, so check the returned value.
    pub async fn open(&mut self, address: u8) -> bool {
        self.address = address;
        self.is_connected().await
    }

    /// Checks the device acknowledges its address.
    ///
    /// Sends a zero-length write. A single missing acknowledge returns `false`; there is no
    /// retry.
    pub async fn is_connected(&mut self) -> bool {
        if self.i2c.write(self.address, &[]).await.is_ok() {
            true
        } else {
            trace!("No acknowledge at {:#x}", self.address);
            false
        }
    }

    /// Applies one of the preset measurement configurations.
    ///
    /// See [`Profile`] for the presets, indexed `0..=5`.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `profile` is above 5. Nothing is written.
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
    /// use lidarlite_v4::LidarLite;
    ///
    /// let mut i2c = Mock::new(&[
    ///     Transaction::write(0x62, vec![0x05, 0x18]),
    ///     Transaction::write(0x62, vec![0xE5, 0x00]),
    /// ]);
    /// let mut sensor = LidarLite::new(&mut i2c, embedded_hal_mock::eh1::delay::NoopDelay);
    ///
    /// // Short range, high speed
    /// sensor.configure(2).unwrap();
    /// drop(sensor);
    /// i2c.done();
    /// ```
    pub async fn configure(&mut self, profile: u8) -> Result<(), Error<E>> {
        let Ok(profile) = Profile::try_from(profile) else {
            error!("Invalid configuration profile: {}", profile);
            return Err(Error::InvalidArgument);
        };
        self.configure_profile(profile).await
    }

    /// Applies a preset measurement configuration.
    ///
    /// Writes the acquisition count first, then the quick termination setting.
    pub async fn configure_profile(&mut self, profile: Profile) -> Result<(), Error<E>> {
        let (acquisition_count, quick_termination) = profile.settings();
        debug!(
            "Applying profile {}: acquisition count {:#x}, quick termination {:#x}",
            profile as u8,
            acquisition_count,
            quick_termination
        );
        self.write_byte(Register::AcquisitionCount, acquisition_count)
            .await?;
        self.write_byte(Register::QuickTermination, quick_termination)
            .await
    }

    /// Changes the I2C address of the device and stores it in its flash.
    ///
    /// The sequence is:
    /// 1. enable flash storage,
    /// 2. read the 4-byte unit ID,
    /// 3. write the unit ID (most significant byte first) followed by `new_address` in one
    ///    transaction at the unit ID register,
    /// 4. switch the driver to `new_address` and probe it every 10 ms, up to 100 times,
    /// 5. if `disable_default` is set, make the device answer on `new_address` only,
    /// 6. disable flash storage.
    ///
    /// Asking for the factory address (0x62) runs [`use_default_address`](Self::use_default_address)
    /// after step 1 instead.
    ///
    /// Failures to toggle flash storage are logged and otherwise ignored. If step 2 or 3 fails,
    /// the sequence stops with flash storage still enabled. If step 5 fails, the call fails even
    /// though the address did change, and flash storage is still disabled.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `new_address` is outside `0x08..=0x77`. Nothing is
    ///   written.
    /// * `Err(Error::DeviceUnresponsive)` - If the device never answered on its new address
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use lidarlite_v4::LidarLite;
    ///
    /// use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
    ///
    /// let mut i2c = Mock::new(&[
    ///     Transaction::write(0x62, vec![0xEA, 0x11]),
    ///     Transaction::write_read(0x62, vec![0x16], vec![0x01, 0x02, 0x03, 0x04]),
    ///     Transaction::write(0x62, vec![0x16, 0x04, 0x03, 0x02, 0x01, 0x50]),
    ///     Transaction::write(0x50, vec![]),
    ///     Transaction::write(0x50, vec![0x1B, 0x01]),
    ///     Transaction::write(0x50, vec![0xEA, 0x00]),
    /// ]);
    /// let delay = embedded_hal_mock::eh1::delay::NoopDelay;
    /// let mut sensor = LidarLite::new(&mut i2c, delay);
    ///
    /// // Move the sensor to 0x50 and stop answering on 0x62
    /// sensor.set_i2c_address(0x50, true).unwrap();
    /// assert_eq!(sensor.address(), 0x50);
    /// drop(sensor);
    /// i2c.done();
    /// ```
    pub async fn set_i2c_address(
        &mut self,
        new_address: u8,
        disable_default: bool,
    ) -> Result<(), Error<E>> {
        self.set_i2c_address_detailed(new_address, disable_default)
            .await
            .map_err(|failure| failure.error)
    }

    /// Same as [`set_i2c_address`](Self::set_i2c_address), reporting which step failed.
    pub async fn set_i2c_address_detailed(
        &mut self,
        new_address: u8,
        disable_default: bool,
    ) -> Result<(), AddressChangeError<E>> {
        if !(MIN_ADDRESS..=MAX_ADDRESS).contains(&new_address) {
            error!("Invalid I2C address: {:#x}", new_address);
            return Err(AddressChangeError {
                step: AddressStep::ValidateAddress,
                error: Error::InvalidArgument,
            });
        }

        self.set_flash_quietly(true).await;

        if new_address == DEFAULT_ADDRESS {
            return self.use_default_address_detailed().await;
        }

        info!("Changing I2C address {:#x} -> {:#x}", self.address, new_address);
        let unit_id = self
            .read_unit_id_bytes()
            .await
            .map_err(AddressChangeError::at(AddressStep::ReadUnitId))?;

        let payload = commit_payload(unit_id, new_address);
        self.write_register(Register::UnitId0, &payload)
            .await
            .map_err(AddressChangeError::at(AddressStep::CommitAddress))?;

        self.address = new_address;
        self.await_address()
            .await
            .map_err(AddressChangeError::at(AddressStep::AwaitAddress))?;

        let selected = if disable_default {
            self.use_new_address_only()
                .await
                .map_err(AddressChangeError::at(AddressStep::SelectAddressMode))
        } else {
            Ok(())
        };

        self.set_flash_quietly(false).await;
        selected
    }

    /// Makes the device answer on the factory address (0x62) only.
    ///
    /// Waits for the device to answer on 0x62 (10 ms pause before each of up to 100 probes),
    /// then switches the driver to it and disables flash storage.
    ///
    /// # Errors
    ///
    /// * `Err(Error::DeviceUnresponsive)` - If the device never answered on 0x62
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn use_default_address(&mut self) -> Result<(), Error<E>> {
        self.use_default_address_detailed()
            .await
            .map_err(|failure| failure.error)
    }

    /// Same as [`use_default_address`](Self::use_default_address), reporting which step failed.
    pub async fn use_default_address_detailed(&mut self) -> Result<(), AddressChangeError<E>> {
        info!("Restoring default I2C address {:#x}", DEFAULT_ADDRESS);
        self.set_address_mode(AddressMode::DefaultOnly)
            .await
            .map_err(AddressChangeError::at(AddressStep::SelectAddressMode))?;

        self.address = DEFAULT_ADDRESS;
        self.await_address()
            .await
            .map_err(AddressChangeError::at(AddressStep::AwaitAddress))?;

        self.set_flash_quietly(false).await;
        Ok(())
    }

    /// Makes the device answer on its custom address only.
    pub async fn use_new_address_only(&mut self) -> Result<(), Error<E>> {
        self.set_address_mode(AddressMode::CustomOnly).await
    }

    /// Makes the device answer on both the factory and its custom address.
    pub async fn use_both_addresses(&mut self) -> Result<(), Error<E>> {
        self.set_address_mode(AddressMode::Both).await
    }

    /// Selects which address(es) the device answers on.
    pub async fn set_address_mode(&mut self, mode: AddressMode) -> Result<(), Error<E>> {
        debug!("Address mode {:#x}", u8::from(mode));
        self.write_byte(Register::I2cConfig, mode.into()).await
    }

    /// Enables or disables writes to the device's flash storage.
    ///
    /// Settings written while flash storage is enabled survive a power cycle.
    pub async fn enable_flash(&mut self, enable: bool) -> Result<(), Error<E>> {
        let value = if enable { FLASH_ENABLE } else { FLASH_DISABLE };
        self.write_byte(Register::EnableFlashStorage, value).await
    }

    async fn set_flash_quietly(&mut self, enable: bool) {
        if self.enable_flash(enable).await.is_err() {
            warn!("Ignoring failure to set flash storage to {}", enable);
        }
    }

    async fn await_address(&mut self) -> Result<(), Error<E>> {
        for attempt in 1..=ADDRESS_POLL_ATTEMPTS {
            self.delay.delay_ms(ADDRESS_POLL_INTERVAL_MS).await;
            if self.is_connected().await {
                debug!("Device answered at {:#x} after {} probes", self.address, attempt);
                return Ok(());
            }
        }
        warn!("Device never answered at {:#x}", self.address);
        Err(Error::DeviceUnresponsive)
    }

    async fn read_unit_id_bytes(&mut self) -> Result<[u8; 4], Error<E>> {
        let mut unit_id = [0u8; 4];
        self.read_register(Register::UnitId0, &mut unit_id).await?;
        Ok(unit_id)
    }

    /// Reads the 32-bit unit ID (serial number) of the device.
    pub async fn unit_id(&mut self) -> Result<u32, Error<E>> {
        Ok(u32::from_le_bytes(self.read_unit_id_bytes().await?))
    }

    /// Reads the custom I2C address currently programmed in the device.
    pub async fn secondary_address(&mut self) -> Result<u8, Error<E>> {
        self.read_byte(Register::I2cSecAddr).await
    }

    /// Starts a distance measurement.
    pub async fn trigger(&mut self) -> Result<(), Error<E>> {
        self.write_byte(Register::AcqCommands, CMD_TAKE_RANGE).await
    }

    /// Reads the busy flag from the status register.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - A measurement is in progress
    /// * `Ok(false)` - The device is idle
    pub async fn busy_flag(&mut self) -> Result<bool, Error<E>> {
        let status = self.read_byte(Register::Status).await?;
        Ok(status & STATUS_BUSY != 0)
    }

    /// Polls the status register until the busy flag clears.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - If the flag is still set after the number of checks set by
    ///   [`MeasurementPolling`]
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    pub async fn wait_for_idle(&mut self) -> Result<(), Error<E>> {
        let MeasurementPolling {
            max_attempts,
            interval_us,
        } = self.polling;
        for _ in 0..max_attempts {
            if !self.busy_flag().await? {
                return Ok(());
            }
            if interval_us > 0 {
                self.delay.delay_us(interval_us).await;
            }
        }
        warn!("Busy flag still set after {} checks", max_attempts);
        Err(Error::Timeout)
    }

    /// Reads the most recent distance measurement, in centimeters.
    pub async fn read_distance(&mut self) -> Result<u16, Error<E>> {
        let mut distance = [0u8; 2];
        self.read_register(Register::FullDelayLow, &mut distance)
            .await?;
        Ok(u16::from_le_bytes(distance))
    }

    /// Takes a measurement and returns the distance in centimeters.
    ///
    /// Runs [`trigger`](Self::trigger), [`wait_for_idle`](Self::wait_for_idle) and
    /// [`read_distance`](Self::read_distance) in that order.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
    /// use lidarlite_v4::LidarLite;
    ///
    /// let mut i2c = Mock::new(&[
    ///     Transaction::write(0x62, vec![0x00, 0x04]),
    ///     Transaction::write_read(0x62, vec![0x01], vec![0x00]),
    ///     Transaction::write_read(0x62, vec![0x10], vec![0x2C, 0x01]),
    /// ]);
    /// let mut sensor = LidarLite::new(&mut i2c, embedded_hal_mock::eh1::delay::NoopDelay);
    ///
    /// assert_eq!(sensor.measure().unwrap(), 300);
    /// drop(sensor);
    /// i2c.done();
    /// ```
    pub async fn measure(&mut self) -> Result<u16, Error<E>> {
        self.trigger().await?;
        self.wait_for_idle().await?;
        self.read_distance().await
    }

    /// Starts a measurement by toggling the trigger pin.
    ///
    /// Drives `trigger` to the opposite of its current level, then polls `monitor` until the
    /// device acknowledges by reading high.
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - If `monitor` never read high within [`MeasurementPolling`]
    /// * `Err(Error::PinError(_))` - If a pin could not be read or driven
    pub async fn trigger_via_pin<T, M>(
        &mut self,
        trigger: &mut T,
        monitor: &mut M,
    ) -> Result<(), Error<E>>
    where
        T: StatefulOutputPin,
        M: InputPin,
    {
        if trigger.is_set_high().map_err(pin_error::<_, E>)? {
            trigger.set_low().map_err(pin_error::<_, E>)?;
        } else {
            trigger.set_high().map_err(pin_error::<_, E>)?;
        }
        self.await_monitor_level(monitor, true).await
    }

    /// Polls the monitor pin until it reads low (device idle).
    ///
    /// # Errors
    ///
    /// * `Err(Error::Timeout)` - If `monitor` never read low within [`MeasurementPolling`]
    /// * `Err(Error::PinError(_))` - If the pin could not be read
    pub async fn wait_for_idle_via_pin<M>(&mut self, monitor: &mut M) -> Result<(), Error<E>>
    where
        M: InputPin,
    {
        self.await_monitor_level(monitor, false).await
    }

    /// Reads the busy flag from the monitor pin. No bus traffic.
    #[allow(clippy::unused_self)]
    pub fn busy_flag_via_pin<M>(&self, monitor: &mut M) -> Result<bool, Error<E>>
    where
        M: InputPin,
    {
        monitor.is_high().map_err(pin_error)
    }

    /// Takes a measurement using the trigger and monitor pins, then reads the distance over I2C.
    pub async fn measure_via_pins<T, M>(
        &mut self,
        trigger: &mut T,
        monitor: &mut M,
    ) -> Result<u16, Error<E>>
    where
        T: StatefulOutputPin,
        M: InputPin,
    {
        self.trigger_via_pin(trigger, monitor).await?;
        self.wait_for_idle_via_pin(monitor).await?;
        self.read_distance().await
    }

    async fn await_monitor_level<M>(&mut self, monitor: &mut M, high: bool) -> Result<(), Error<E>>
    where
        M: InputPin,
    {
        let MeasurementPolling {
            max_attempts,
            interval_us,
        } = self.polling;
        for _ in 0..max_attempts {
            if monitor.is_high().map_err(pin_error::<_, E>)? == high {
                return Ok(());
            }
            if interval_us > 0 {
                self.delay.delay_us(interval_us).await;
            }
        }
        warn!("Monitor pin never read {} after {} checks", high, max_attempts);
        Err(Error::Timeout)
    }

    /// Reads the correlation record of the last measurement.
    ///
    /// Fills `record` with one signed point per slot, read one at a time from the correlation
    /// data register. At least one measurement must have completed for the data to mean
    /// anything.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `record` holds more than 192 points. Nothing is read.
    /// * `Err(Error::I2cError(E))` - If there was an I2C communication error
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
    /// use lidarlite_v4::LidarLite;
    ///
    /// let mut i2c = Mock::new(&[
    ///     Transaction::write(0x62, vec![0x00, 0x04]),
    ///     Transaction::write_read(0x62, vec![0x01], vec![0x00]),
    ///     Transaction::write_read(0x62, vec![0x10], vec![0x2C, 0x01]),
    ///     Transaction::write_read(0x62, vec![0x52], vec![0x40, 0x00]),
    ///     Transaction::write_read(0x62, vec![0x52], vec![0xC0, 0xFF]),
    /// ]);
    /// let mut sensor = LidarLite::new(&mut i2c, embedded_hal_mock::eh1::delay::NoopDelay);
    ///
    /// let mut record = [0i16; 2];
    /// sensor.measure().unwrap();
    /// sensor.read_correlation_record(&mut record).unwrap();
    /// assert_eq!(record, [64, -64]);
    /// drop(sensor);
    /// i2c.done();
    /// ```
    pub async fn read_correlation_record(&mut self, record: &mut [i16]) -> Result<(), Error<E>> {
        if record.len() > CORRELATION_RECORD_LEN {
            error!("Correlation record too long: {}", record.len());
            return Err(Error::InvalidArgument);
        }
        for point in record.iter_mut() {
            let mut bytes = [0u8; 2];
            self.read_register(Register::CorrData, &mut bytes).await?;
            *point = i16::from_le_bytes(bytes);
        }
        Ok(())
    }

    /// Reads the board temperature in degrees Celsius.
    pub async fn board_temperature(&mut self) -> Result<i8, Error<E>> {
        let raw = self.read_byte(Register::BoardTemperature).await?;
        Ok(i8::from_le_bytes([raw]))
    }

    /// Reads the SoC temperature in degrees Celsius.
    pub async fn soc_temperature(&mut self) -> Result<i8, Error<E>> {
        let raw = self.read_byte(Register::SocTemperature).await?;
        Ok(i8::from_le_bytes([raw]))
    }

    /// Reads the board hardware version.
    pub async fn hardware_version(&mut self) -> Result<u8, Error<E>> {
        self.read_byte(Register::HardwareVersion).await
    }

    /// Sets the number of measurements averaged per result. Zero disables averaging.
    pub async fn set_high_accuracy_mode(&mut self, count: u8) -> Result<(), Error<E>> {
        self.write_byte(Register::HighAccuracyMode, count).await
    }

    /// Sets the power state of the device.
    pub async fn set_power_mode(&mut self, mode: PowerMode) -> Result<(), Error<E>> {
        self.write_byte(Register::PowerMode, mode.into()).await
    }

    /// Sets the delay between automatic measurements.
    pub async fn set_measurement_interval(&mut self, interval: u8) -> Result<(), Error<E>> {
        self.write_byte(Register::MeasurementInterval, interval)
            .await
    }

    /// Sets the detection sensitivity. Zero keeps the device's own threshold.
    pub async fn set_detection_sensitivity(&mut self, sensitivity: u8) -> Result<(), Error<E>> {
        self.write_byte(Register::DetectionSensitivity, sensitivity)
            .await
    }

    /// Restores the factory settings of the device.
    pub async fn factory_reset(&mut self) -> Result<(), Error<E>> {
        info!("Factory reset at {:#x}", self.address);
        self.write_byte(Register::FactoryReset, FACTORY_RESET_CMD)
            .await
    }

    /// Writes `data` starting at `register` in a single I2C write.
    ///
    /// The device auto-increments its register pointer after each byte.
    ///
    /// # Errors
    ///
    /// * `Err(Error::InvalidArgument)` - If `data` is longer than [`MAX_WRITE_LEN`]
    /// * `Err(Error::I2cError(E))` - If the device did not acknowledge the write
    pub async fn write_register<R>(&mut self, register: R, data: &[u8]) -> Result<(), Error<E>>
    where
        R: Into<u8>,
    {
        let reg: u8 = register.into();
        if data.len() > MAX_WRITE_LEN {
            error!("Write of {} bytes at {:#x} too long", data.len(), reg);
            return Err(Error::InvalidArgument);
        }
        let mut buffer = [0u8; MAX_WRITE_LEN + 1];
        buffer[0] = reg;
        buffer[1..=data.len()].copy_from_slice(data);
        trace!("write {:#x} ({} bytes) at {:#x}", reg, data.len(), self.address);
        self.i2c
            .write(self.address, &buffer[..=data.len()])
            .await?;
        Ok(())
    }

    /// Reads `buffer.len()` bytes starting at `register`.
    ///
    /// Sets the register pointer, then reads after a repeated start.
    pub async fn read_register<R>(&mut self, register: R, buffer: &mut [u8]) -> Result<(), Error<E>>
    where
        R: Into<u8>,
    {
        let reg: u8 = register.into();
        trace!("read {:#x} ({} bytes) at {:#x}", reg, buffer.len(), self.address);
        self.i2c.write_read(self.address, &[reg], buffer).await?;
        Ok(())
    }

    /// Writes a single byte to `register`.
    pub async fn write_byte<R>(&mut self, register: R, value: u8) -> Result<(), Error<E>>
    where
        R: Into<u8>,
    {
        self.write_register(register, &[value]).await
    }

    /// Reads a single byte from `register`.
    pub async fn read_byte<R>(&mut self, register: R) -> Result<u8, Error<E>>
    where
        R: Into<u8>,
    {
        let mut value = [0u8; 1];
        self.read_register(register, &mut value).await?;
        Ok(value[0])
    }
}

/// Errors reported by the driver.
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E: core::fmt::Debug> {
    /// The bus transaction failed, typically a missing acknowledge
    I2cError(E),
    /// A trigger or monitor pin could not be read or driven
    PinError(embedded_hal::digital::ErrorKind),
    /// Address, profile index, record length or payload length out of range
    InvalidArgument,
    /// The device never answered on its address after 100 probes
    DeviceUnresponsive,
    /// The busy flag did not clear within the configured number of checks
    Timeout,
}

impl<E: core::fmt::Debug> core::fmt::Display for Error<E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl<E: core::fmt::Debug> From<E> for Error<E> {
    fn from(error: E) -> Self {
        Error::I2cError(error)
    }
}
