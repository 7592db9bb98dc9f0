//! Handlers for `dance-coach settings`.

use anyhow::Result;

use crate::{
    cli::SettingsCommand,
    settings::UserSettings,
    AppState,
};

pub fn handle_settings(state: &AppState, command: SettingsCommand) -> Result<UserSettings> {
    match command {
        SettingsCommand::Show => Ok(state.settings.get()),
        SettingsCommand::Reset => state.settings.reset(),
        SettingsCommand::Set {
            scoring,
            analyzer,
            clear_analyzer,
            coach_timeout_secs,
        } => state.settings.update(|settings| {
            settings.scoring = scoring.apply(settings.scoring);
            if clear_analyzer {
                settings.coaching.analyzer_command = None;
            } else if let Some(command) = analyzer {
                settings.coaching.analyzer_command = Some(command);
            }
            if let Some(secs) = coach_timeout_secs {
                settings.coaching.timeout_secs = secs.max(1);
            }
        }),
    }
}
