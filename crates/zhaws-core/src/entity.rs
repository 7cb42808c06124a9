// ── Entity command handles ──
//
// Typed verbs for one mirrored entity. Every verb sends a correlated
// command and returns once the server answers; the mirror is updated only
// by the state-changed event that follows.

use zhaws_api::command::{
    AlarmCodeParams, ClimateSetHvacModeParams, ClimateSetTemperatureParams, CoverPositionParams,
    CoverRestoreParams, CoverTiltPositionParams, FanModeParams, FanPercentageParams,
    FanTurnOnParams, FirmwareInstallParams, LightRestoreParams, LightTurnOffParams,
    LightTurnOnParams, LockCodeSlotParams, LockRestoreParams, LockUserCodeParams,
    NumberValueParams, PresetModeParams, SelectOptionParams, SelectRestoreParams,
    SirenTurnOnParams,
};
use zhaws_api::model::{EntityInfo, EntityRef, EntityState, HvacMode, Platform};
use zhaws_api::{Command, EntityCommand, EntityTarget};

use crate::controller::Controller;
use crate::error::CoreError;

/// Alarm panel transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum AlarmAction {
    Disarm,
    ArmHome,
    ArmAway,
    ArmNight,
    Trigger,
}

/// Command handle for one entity, bound to the controller that mirrors it.
///
/// Holds the entity descriptor as it was when the handle was created;
/// use [`state`](Self::state) for the live value.
#[derive(Debug, Clone)]
pub struct EntityHandle {
    controller: Controller,
    info: EntityInfo,
    target: EntityTarget,
}

impl EntityHandle {
    pub(crate) fn new(controller: Controller, info: EntityInfo) -> Self {
        let target = EntityTarget::from(&info);
        Self {
            controller,
            info,
            target,
        }
    }

    pub fn info(&self) -> &EntityInfo {
        &self.info
    }

    pub fn platform(&self) -> Platform {
        self.info.platform
    }

    pub fn entity_ref(&self) -> EntityRef {
        self.info.entity_ref()
    }

    /// Current state from the mirror, or `None` once the entity is gone.
    pub fn state(&self) -> Option<EntityState> {
        self.controller
            .store()
            .entity(&self.entity_ref())
            .map(|info| info.state)
    }

    // ── Generic verbs ────────────────────────────────────────────────

    /// Switch the entity on with the platform's default parameters.
    pub async fn turn_on(&self) -> Result<(), CoreError> {
        let command = match self.platform() {
            Platform::Light => Command::LightTurnOn(self.with(LightTurnOnParams::default())),
            Platform::Switch => Command::SwitchTurnOn(self.bare()),
            Platform::Siren => Command::SirenTurnOn(self.with(SirenTurnOnParams::default())),
            Platform::Fan => Command::FanTurnOn(self.with(FanTurnOnParams::default())),
            platform => {
                return Err(CoreError::Unsupported {
                    operation: "turn_on",
                    platform,
                });
            }
        };
        self.run(command).await
    }

    pub async fn turn_off(&self) -> Result<(), CoreError> {
        let command = match self.platform() {
            Platform::Light => Command::LightTurnOff(self.with(LightTurnOffParams::default())),
            Platform::Switch => Command::SwitchTurnOff(self.bare()),
            Platform::Siren => Command::SirenTurnOff(self.bare()),
            Platform::Fan => Command::FanTurnOff(self.bare()),
            platform => {
                return Err(CoreError::Unsupported {
                    operation: "turn_off",
                    platform,
                });
            }
        };
        self.run(command).await
    }

    /// Ask the server to re-read the entity's state from the device.
    pub async fn refresh_state(&self) -> Result<(), CoreError> {
        self.run(Command::PlatformEntityRefreshState(self.bare()))
            .await
    }

    pub async fn enable(&self) -> Result<(), CoreError> {
        self.run(Command::PlatformEntityEnable(self.bare())).await
    }

    pub async fn disable(&self) -> Result<(), CoreError> {
        self.run(Command::PlatformEntityDisable(self.bare())).await
    }

    // ── Light ────────────────────────────────────────────────────────

    pub async fn light_turn_on(&self, params: LightTurnOnParams) -> Result<(), CoreError> {
        self.require(Platform::Light, "light_turn_on")?;
        self.run(Command::LightTurnOn(self.with(params))).await
    }

    pub async fn light_turn_off(&self, params: LightTurnOffParams) -> Result<(), CoreError> {
        self.require(Platform::Light, "light_turn_off")?;
        self.run(Command::LightTurnOff(self.with(params))).await
    }

    /// Restore light attributes the device does not report back.
    pub async fn light_restore(&self, params: LightRestoreParams) -> Result<(), CoreError> {
        self.require(Platform::Light, "light_restore_external_state_attributes")?;
        self.run(Command::LightRestoreExternalStateAttributes(self.with(params)))
            .await
    }

    // ── Siren ────────────────────────────────────────────────────────

    pub async fn siren_turn_on(&self, params: SirenTurnOnParams) -> Result<(), CoreError> {
        self.require(Platform::Siren, "siren_turn_on")?;
        self.run(Command::SirenTurnOn(self.with(params))).await
    }

    // ── Lock ─────────────────────────────────────────────────────────

    pub async fn lock(&self) -> Result<(), CoreError> {
        self.require(Platform::Lock, "lock_lock")?;
        self.run(Command::LockLock(self.bare())).await
    }

    pub async fn unlock(&self) -> Result<(), CoreError> {
        self.require(Platform::Lock, "lock_unlock")?;
        self.run(Command::LockUnlock(self.bare())).await
    }

    pub async fn set_user_code(&self, code_slot: u16, user_code: impl Into<String>) -> Result<(), CoreError> {
        self.require(Platform::Lock, "lock_set_user_lock_code")?;
        let params = LockUserCodeParams {
            code_slot,
            user_code: user_code.into(),
        };
        self.run(Command::LockSetUserCode(self.with(params))).await
    }

    pub async fn enable_user_code(&self, code_slot: u16) -> Result<(), CoreError> {
        self.require(Platform::Lock, "lock_enable_user_lock_code")?;
        self.run(Command::LockEnableUserCode(self.with(LockCodeSlotParams { code_slot })))
            .await
    }

    pub async fn disable_user_code(&self, code_slot: u16) -> Result<(), CoreError> {
        self.require(Platform::Lock, "lock_disable_user_lock_code")?;
        self.run(Command::LockDisableUserCode(self.with(LockCodeSlotParams { code_slot })))
            .await
    }

    pub async fn clear_user_code(&self, code_slot: u16) -> Result<(), CoreError> {
        self.require(Platform::Lock, "lock_clear_user_lock_code")?;
        self.run(Command::LockClearUserCode(self.with(LockCodeSlotParams { code_slot })))
            .await
    }

    pub async fn lock_restore(&self, params: LockRestoreParams) -> Result<(), CoreError> {
        self.require(Platform::Lock, "lock_restore_external_state_attributes")?;
        self.run(Command::LockRestoreExternalStateAttributes(self.with(params)))
            .await
    }

    // ── Climate ──────────────────────────────────────────────────────

    pub async fn set_temperature(&self, params: ClimateSetTemperatureParams) -> Result<(), CoreError> {
        self.require(Platform::Climate, "climate_set_temperature")?;
        self.run(Command::ClimateSetTemperature(self.with(params))).await
    }

    pub async fn set_hvac_mode(&self, hvac_mode: HvacMode) -> Result<(), CoreError> {
        self.require(Platform::Climate, "climate_set_hvac_mode")?;
        self.run(Command::ClimateSetHvacMode(self.with(ClimateSetHvacModeParams { hvac_mode })))
            .await
    }

    pub async fn set_fan_mode(&self, fan_mode: impl Into<String>) -> Result<(), CoreError> {
        self.require(Platform::Climate, "climate_set_fan_mode")?;
        let params = FanModeParams {
            fan_mode: fan_mode.into(),
        };
        self.run(Command::ClimateSetFanMode(self.with(params))).await
    }

    /// Preset mode for a thermostat or a fan.
    pub async fn set_preset_mode(&self, preset_mode: impl Into<String>) -> Result<(), CoreError> {
        let params = PresetModeParams {
            preset_mode: preset_mode.into(),
        };
        let command = match self.platform() {
            Platform::Climate => Command::ClimateSetPresetMode(self.with(params)),
            Platform::Fan => Command::FanSetPresetMode(self.with(params)),
            platform => {
                return Err(CoreError::Unsupported {
                    operation: "set_preset_mode",
                    platform,
                });
            }
        };
        self.run(command).await
    }

    // ── Cover ────────────────────────────────────────────────────────

    pub async fn open(&self) -> Result<(), CoreError> {
        self.require(Platform::Cover, "cover_open")?;
        self.run(Command::CoverOpen(self.bare())).await
    }

    pub async fn close(&self) -> Result<(), CoreError> {
        self.require(Platform::Cover, "cover_close")?;
        self.run(Command::CoverClose(self.bare())).await
    }

    pub async fn stop(&self) -> Result<(), CoreError> {
        self.require(Platform::Cover, "cover_stop")?;
        self.run(Command::CoverStop(self.bare())).await
    }

    pub async fn open_tilt(&self) -> Result<(), CoreError> {
        self.require(Platform::Cover, "cover_open_tilt")?;
        self.run(Command::CoverOpenTilt(self.bare())).await
    }

    pub async fn close_tilt(&self) -> Result<(), CoreError> {
        self.require(Platform::Cover, "cover_close_tilt")?;
        self.run(Command::CoverCloseTilt(self.bare())).await
    }

    pub async fn stop_tilt(&self) -> Result<(), CoreError> {
        self.require(Platform::Cover, "cover_stop_tilt")?;
        self.run(Command::CoverStopTilt(self.bare())).await
    }

    pub async fn set_position(&self, position: u8) -> Result<(), CoreError> {
        self.require(Platform::Cover, "cover_set_position")?;
        self.run(Command::CoverSetPosition(self.with(CoverPositionParams { position })))
            .await
    }

    pub async fn set_tilt_position(&self, tilt_position: u8) -> Result<(), CoreError> {
        self.require(Platform::Cover, "cover_set_tilt_position")?;
        let params = CoverTiltPositionParams { tilt_position };
        self.run(Command::CoverSetTiltPosition(self.with(params))).await
    }

    pub async fn cover_restore(&self, params: CoverRestoreParams) -> Result<(), CoreError> {
        self.require(Platform::Cover, "cover_restore_external_state_attributes")?;
        self.run(Command::CoverRestoreExternalStateAttributes(self.with(params)))
            .await
    }

    // ── Fan ──────────────────────────────────────────────────────────

    pub async fn fan_turn_on(&self, params: FanTurnOnParams) -> Result<(), CoreError> {
        self.require(Platform::Fan, "fan_turn_on")?;
        self.run(Command::FanTurnOn(self.with(params))).await
    }

    pub async fn set_percentage(&self, percentage: u8) -> Result<(), CoreError> {
        self.require(Platform::Fan, "fan_set_percentage")?;
        self.run(Command::FanSetPercentage(self.with(FanPercentageParams { percentage })))
            .await
    }

    // ── Button, select, number, alarm, update ────────────────────────

    pub async fn press(&self) -> Result<(), CoreError> {
        self.require(Platform::Button, "button_press")?;
        self.run(Command::ButtonPress(self.bare())).await
    }

    pub async fn select_option(&self, option: impl Into<String>) -> Result<(), CoreError> {
        self.require(Platform::Select, "select_select_option")?;
        let params = SelectOptionParams {
            option: option.into(),
        };
        self.run(Command::SelectSelectOption(self.with(params))).await
    }

    pub async fn select_restore(&self, state: impl Into<String>) -> Result<(), CoreError> {
        self.require(Platform::Select, "select_restore_external_state_attributes")?;
        let params = SelectRestoreParams {
            state: state.into(),
        };
        self.run(Command::SelectRestoreExternalStateAttributes(self.with(params)))
            .await
    }

    pub async fn set_value(&self, value: f64) -> Result<(), CoreError> {
        self.require(Platform::Number, "number_set_value")?;
        self.run(Command::NumberSetValue(self.with(NumberValueParams { value })))
            .await
    }

    pub async fn alarm(&self, action: AlarmAction, code: Option<String>) -> Result<(), CoreError> {
        self.require(Platform::AlarmControlPanel, "alarm_control_panel")?;
        let cmd = self.with(AlarmCodeParams { code });
        let command = match action {
            AlarmAction::Disarm => Command::AlarmControlPanelDisarm(cmd),
            AlarmAction::ArmHome => Command::AlarmControlPanelArmHome(cmd),
            AlarmAction::ArmAway => Command::AlarmControlPanelArmAway(cmd),
            AlarmAction::ArmNight => Command::AlarmControlPanelArmNight(cmd),
            AlarmAction::Trigger => Command::AlarmControlPanelTrigger(cmd),
        };
        self.run(command).await
    }

    pub async fn install_firmware(&self, version: Option<String>) -> Result<(), CoreError> {
        self.require(Platform::Update, "firmware_install")?;
        self.run(Command::FirmwareInstall(self.with(FirmwareInstallParams { version })))
            .await
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn require(&self, platform: Platform, operation: &'static str) -> Result<(), CoreError> {
        if self.platform() == platform {
            Ok(())
        } else {
            Err(CoreError::Unsupported {
                operation,
                platform: self.platform(),
            })
        }
    }

    fn with<P>(&self, params: P) -> EntityCommand<P> {
        EntityCommand::new(self.target.clone(), params)
    }

    fn bare(&self) -> EntityCommand<zhaws_api::NoParams> {
        EntityCommand::bare(self.target.clone())
    }

    async fn run(&self, command: Command) -> Result<(), CoreError> {
        let entity = self.target.unique_id.clone();
        self.controller
            .execute(command)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                CoreError::CommandFailed { ref code, .. }
                    if code == zhaws_api::codes::ENTITY_NOT_FOUND =>
                {
                    CoreError::EntityNotFound { entity }
                }
                other => other,
            })
    }
}
