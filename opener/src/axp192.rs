//! AXP192 power-management chip: battery ADC and LCD backlight rail.

use embedded_hal::i2c::I2c;

pub const AXP192_ADDR: u8 = 0x34;

const REG_EXTEN_DCDC2: u8 = 0x10;
const REG_POWER_OUTPUT: u8 = 0x12;
const REG_LDO23_VOLTAGE: u8 = 0x28;
const REG_VBUS_IPSOUT: u8 = 0x30;
const REG_CHARGE_CTRL1: u8 = 0x33;
const REG_PEK: u8 = 0x36;
const REG_BAT_VOLTAGE_H: u8 = 0x78;
const REG_ADC_ENABLE1: u8 = 0x82;

// 12-bit battery ADC, 1.1 mV per LSB.
const BAT_MV_PER_LSB: f32 = 1.1;

pub struct Axp192<I2C> {
    i2c: I2C,
}

impl<I2C, E> Axp192<I2C>
where
    I2C: I2c<Error = E>,
{
    pub fn new(i2c: I2C) -> Self {
        Self { i2c }
    }

    /// Power-on register setup for the handheld: LCD rails on, ADCs on.
    pub fn init(&mut self) -> Result<(), E> {
        self.write(REG_EXTEN_DCDC2, 0xff)?;
        // LDO2 (backlight) and LDO3 (LCD logic) at 3.0 V
        self.write(REG_LDO23_VOLTAGE, 0xcc)?;
        self.write(REG_ADC_ENABLE1, 0xff)?;
        // charge to 4.2 V at 100 mA
        self.write(REG_CHARGE_CTRL1, 0xc0)?;
        // DCDC1, LDO2, LDO3, EXTEN on
        self.write(REG_POWER_OUTPUT, 0x4d)?;
        self.write(REG_PEK, 0x0c)?;
        self.write(REG_VBUS_IPSOUT, 0x80)?;
        Ok(())
    }

    pub fn set_backlight(&mut self, brightness_pct: u8) -> Result<(), E> {
        let current = self.read(REG_LDO23_VOLTAGE)?;
        let step = backlight_ldo2_step(brightness_pct);
        self.write(REG_LDO23_VOLTAGE, (current & 0x0f) | (step << 4))
    }

    pub fn battery_volts(&mut self) -> Result<f32, E> {
        let mut buf = [0_u8; 2];
        self.i2c
            .write_read(AXP192_ADDR, &[REG_BAT_VOLTAGE_H], &mut buf)?;
        Ok(battery_volts_from_raw(buf[0], buf[1]))
    }

    fn read(&mut self, reg: u8) -> Result<u8, E> {
        let mut buf = [0_u8; 1];
        self.i2c.write_read(AXP192_ADDR, &[reg], &mut buf)?;
        Ok(buf[0])
    }

    fn write(&mut self, reg: u8, value: u8) -> Result<(), E> {
        self.i2c.write(AXP192_ADDR, &[reg, value])
    }
}

/// LDO2 voltage step (1.8 V + 0.1 V * step) for a 0..=100 % brightness,
/// spread over the 2.5 V..3.2 V range the backlight is usable in.
pub fn backlight_ldo2_step(brightness_pct: u8) -> u8 {
    let pct = u32::from(brightness_pct.min(100));
    let millivolts = 2_500 + pct * 700 / 100;
    ((millivolts - 1_800) / 100) as u8
}

pub fn battery_volts_from_raw(high: u8, low: u8) -> f32 {
    let raw = (u16::from(high) << 4) | u16::from(low & 0x0f);
    f32::from(raw) * BAT_MV_PER_LSB / 1_000.0
}
