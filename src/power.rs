//! Power agent (C3): cut, apply T30 only, or apply T30+T15 to the module.
//!
//! All three operations are idempotent; state is tracked only for tracing,
//! never consulted to skip a call.

/// Capability contract for module power control.
pub trait PowerAgent {
    /// Removes all module power.
    fn set_power_off(&mut self);

    /// Applies the always-on rail only. The module enters the bootloader
    /// and quietly times out to the application if left idle.
    fn set_power_t30(&mut self);

    /// Applies both the always-on and ignition rails; the module runs the
    /// application.
    fn set_power_t30_t15(&mut self);
}

/// A no-op power agent that only prints instructions for a human operator,
/// for setups with no programmable power control.
#[derive(Debug, Default)]
pub struct ManualPower;

impl PowerAgent for ManualPower {
    fn set_power_off(&mut self) {
        println!("POWER: turn module power off");
    }

    fn set_power_t30(&mut self) {
        println!("POWER: turn module power on (T30 only)");
    }

    fn set_power_t30_t15(&mut self) {
        println!("POWER: turn module power on (T30 and T15)");
    }
}

/// Two analog outputs driven to 12 V to represent T30/T15, as exposed by
/// adapters such as the AnaGate CAN X* series. The CAN transport library is
/// out of scope for this crate, so the adapter only needs to expose this
/// narrow capability rather than a specific vendor API.
pub trait AnalogOutputs {
    fn set_output(&mut self, channel: u8, millivolts: u32);
}

/// Power agent for adapters that expose two programmable analog outputs.
pub struct AnalogPower<A: AnalogOutputs> {
    outputs: A,
}

impl<A: AnalogOutputs> AnalogPower<A> {
    pub fn new(outputs: A) -> Self {
        AnalogPower { outputs }
    }
}

impl<A: AnalogOutputs> PowerAgent for AnalogPower<A> {
    fn set_power_off(&mut self) {
        self.outputs.set_output(1, 0);
        self.outputs.set_output(2, 0);
    }

    fn set_power_t30(&mut self) {
        self.outputs.set_output(1, 12000);
        self.outputs.set_output(2, 0);
    }

    fn set_power_t30_t15(&mut self) {
        self.outputs.set_output(1, 12000);
        self.outputs.set_output(2, 12000);
    }
}
