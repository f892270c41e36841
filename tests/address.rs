#![cfg(not(feature = "async"))]

use embedded_hal::i2c::{ErrorKind, NoAcknowledgeSource};
use embedded_hal_mock::eh1::delay::NoopDelay;
use embedded_hal_mock::eh1::i2c::{Mock, Transaction};
use lidarlite_v4::{AddressStep, Error, LidarLite, ADDRESS_POLL_ATTEMPTS};

const UNIT_ID_0: u8 = 0x16;
const I2C_CONFIG: u8 = 0x1B;
const ENABLE_FLASH_STORAGE: u8 = 0xEA;

fn nack() -> ErrorKind {
    ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address)
}

fn silent_probes(address: u8) -> impl Iterator<Item = Transaction> {
    std::iter::repeat(Transaction::write(address, vec![]).with_error(nack()))
        .take(ADDRESS_POLL_ATTEMPTS as usize)
}

#[test]
fn set_address_commits_reversed_unit_id() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x62, vec![ENABLE_FLASH_STORAGE, 0x11]),
        Transaction::write_read(0x62, vec![UNIT_ID_0], vec![0x01, 0x02, 0x03, 0x04]),
        Transaction::write(0x62, vec![UNIT_ID_0, 0x04, 0x03, 0x02, 0x01, 0x50]),
        Transaction::write(0x50, vec![]),
        Transaction::write(0x50, vec![I2C_CONFIG, 0x01]),
        Transaction::write(0x50, vec![ENABLE_FLASH_STORAGE, 0x00]),
    ]);
    let mut sensor = LidarLite::new(&mut i2c, NoopDelay);

    sensor.set_i2c_address(0x50, true).unwrap();
    assert_eq!(sensor.address(), 0x50);
    drop(sensor);
    i2c.done();
}

#[test]
fn set_address_keeps_default_when_asked() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x62, vec![ENABLE_FLASH_STORAGE, 0x11]),
        Transaction::write_read(0x62, vec![UNIT_ID_0], vec![0xAA, 0xBB, 0xCC, 0xDD]),
        Transaction::write(0x62, vec![UNIT_ID_0, 0xDD, 0xCC, 0xBB, 0xAA, 0x30]),
        Transaction::write(0x30, vec![]).with_error(nack()),
        Transaction::write(0x30, vec![]).with_error(nack()),
        Transaction::write(0x30, vec![]),
        Transaction::write(0x30, vec![ENABLE_FLASH_STORAGE, 0x00]),
    ]);
    let mut sensor = LidarLite::new(&mut i2c, NoopDelay);

    sensor.set_i2c_address(0x30, false).unwrap();
    assert_eq!(sensor.address(), 0x30);
    drop(sensor);
    i2c.done();
}

#[test]
fn set_address_rejects_reserved_addresses() {
    let mut i2c = Mock::new(&[]);
    let mut sensor = LidarLite::new(&mut i2c, NoopDelay);

    for address in [0x00, 0x07, 0x78, 0x7F, 0xFF] {
        let failure = sensor.set_i2c_address_detailed(address, true).unwrap_err();
        assert_eq!(failure.step, AddressStep::ValidateAddress);
        assert!(matches!(failure.error, Error::InvalidArgument));
    }
    assert_eq!(sensor.address(), 0x62);
    drop(sensor);
    i2c.done();
}

#[test]
fn set_address_to_default_restores_default() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x50, vec![ENABLE_FLASH_STORAGE, 0x11]),
        Transaction::write(0x50, vec![I2C_CONFIG, 0x00]),
        Transaction::write(0x62, vec![]),
        Transaction::write(0x62, vec![ENABLE_FLASH_STORAGE, 0x00]),
    ]);
    let mut sensor = LidarLite::with_address(&mut i2c, NoopDelay, 0x50);

    sensor.set_i2c_address(0x62, true).unwrap();
    assert_eq!(sensor.address(), 0x62);
    drop(sensor);
    i2c.done();
}

#[test]
fn use_default_address_waits_for_device() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x50, vec![I2C_CONFIG, 0x00]),
        Transaction::write(0x62, vec![]).with_error(nack()),
        Transaction::write(0x62, vec![]),
        Transaction::write(0x62, vec![ENABLE_FLASH_STORAGE, 0x00]),
    ]);
    let mut sensor = LidarLite::with_address(&mut i2c, NoopDelay, 0x50);

    sensor.use_default_address().unwrap();
    assert_eq!(sensor.address(), 0x62);
    drop(sensor);
    i2c.done();
}

#[test]
fn set_address_gives_up_after_bounded_probes() {
    let mut expectations = vec![
        Transaction::write(0x62, vec![ENABLE_FLASH_STORAGE, 0x11]),
        Transaction::write_read(0x62, vec![UNIT_ID_0], vec![0x01, 0x02, 0x03, 0x04]),
        Transaction::write(0x62, vec![UNIT_ID_0, 0x04, 0x03, 0x02, 0x01, 0x50]),
    ];
    expectations.extend(silent_probes(0x50));
    let mut i2c = Mock::new(&expectations);
    let mut sensor = LidarLite::new(&mut i2c, NoopDelay);

    let failure = sensor.set_i2c_address_detailed(0x50, true).unwrap_err();
    assert_eq!(failure.step, AddressStep::AwaitAddress);
    assert!(matches!(failure.error, Error::DeviceUnresponsive));
    // the driver already moved to the new address
    assert_eq!(sensor.address(), 0x50);
    drop(sensor);
    i2c.done();
}

#[test]
fn use_default_address_gives_up_after_bounded_probes() {
    let mut expectations = vec![Transaction::write(0x50, vec![I2C_CONFIG, 0x00])];
    expectations.extend(silent_probes(0x62));
    let mut i2c = Mock::new(&expectations);
    let mut sensor = LidarLite::with_address(&mut i2c, NoopDelay, 0x50);

    assert!(matches!(
        sensor.use_default_address(),
        Err(Error::DeviceUnresponsive)
    ));
    drop(sensor);
    i2c.done();
}

#[test]
fn failed_commit_leaves_flash_enabled() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x62, vec![ENABLE_FLASH_STORAGE, 0x11]),
        Transaction::write_read(0x62, vec![UNIT_ID_0], vec![0x01, 0x02, 0x03, 0x04]),
        Transaction::write(0x62, vec![UNIT_ID_0, 0x04, 0x03, 0x02, 0x01, 0x50])
            .with_error(nack()),
    ]);
    let mut sensor = LidarLite::new(&mut i2c, NoopDelay);

    let failure = sensor.set_i2c_address_detailed(0x50, true).unwrap_err();
    assert_eq!(failure.step, AddressStep::CommitAddress);
    assert!(matches!(failure.error, Error::I2cError(_)));
    assert_eq!(sensor.address(), 0x62);
    drop(sensor);
    i2c.done();
}

#[test]
fn failed_unit_id_read_stops_sequence() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x62, vec![ENABLE_FLASH_STORAGE, 0x11]),
        Transaction::write_read(0x62, vec![UNIT_ID_0], vec![0x00; 4]).with_error(nack()),
    ]);
    let mut sensor = LidarLite::new(&mut i2c, NoopDelay);

    let failure = sensor.set_i2c_address_detailed(0x50, false).unwrap_err();
    assert_eq!(failure.step, AddressStep::ReadUnitId);
    drop(sensor);
    i2c.done();
}

#[test]
fn failed_mode_selection_still_disables_flash() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x62, vec![ENABLE_FLASH_STORAGE, 0x11]),
        Transaction::write_read(0x62, vec![UNIT_ID_0], vec![0x01, 0x02, 0x03, 0x04]),
        Transaction::write(0x62, vec![UNIT_ID_0, 0x04, 0x03, 0x02, 0x01, 0x50]),
        Transaction::write(0x50, vec![]),
        Transaction::write(0x50, vec![I2C_CONFIG, 0x01]).with_error(nack()),
        Transaction::write(0x50, vec![ENABLE_FLASH_STORAGE, 0x00]),
    ]);
    let mut sensor = LidarLite::new(&mut i2c, NoopDelay);

    let failure = sensor.set_i2c_address_detailed(0x50, true).unwrap_err();
    assert_eq!(failure.step, AddressStep::SelectAddressMode);
    assert_eq!(sensor.address(), 0x50);
    drop(sensor);
    i2c.done();
}

#[test]
fn flash_toggle_failures_are_ignored() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x62, vec![ENABLE_FLASH_STORAGE, 0x11]).with_error(nack()),
        Transaction::write_read(0x62, vec![UNIT_ID_0], vec![0x01, 0x02, 0x03, 0x04]),
        Transaction::write(0x62, vec![UNIT_ID_0, 0x04, 0x03, 0x02, 0x01, 0x50]),
        Transaction::write(0x50, vec![]),
        Transaction::write(0x50, vec![ENABLE_FLASH_STORAGE, 0x00]).with_error(nack()),
    ]);
    let mut sensor = LidarLite::new(&mut i2c, NoopDelay);

    sensor.set_i2c_address(0x50, false).unwrap();
    drop(sensor);
    i2c.done();
}

#[test]
fn address_mode_writes() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x50, vec![I2C_CONFIG, 0x01]),
        Transaction::write(0x50, vec![I2C_CONFIG, 0x02]),
        Transaction::write(0x50, vec![ENABLE_FLASH_STORAGE, 0x11]),
        Transaction::write(0x50, vec![ENABLE_FLASH_STORAGE, 0x00]),
    ]);
    let mut sensor = LidarLite::with_address(&mut i2c, NoopDelay, 0x50);

    sensor.use_new_address_only().unwrap();
    sensor.use_both_addresses().unwrap();
    sensor.enable_flash(true).unwrap();
    sensor.enable_flash(false).unwrap();
    drop(sensor);
    i2c.done();
}

#[test]
fn address_mode_write_failure_is_reported() {
    let mut i2c = Mock::new(&[
        Transaction::write(0x50, vec![I2C_CONFIG, 0x02]).with_error(nack())
    ]);
    let mut sensor = LidarLite::with_address(&mut i2c, NoopDelay, 0x50);

    assert!(matches!(sensor.use_both_addresses(), Err(Error::I2cError(_))));
    drop(sensor);
    i2c.done();
}
