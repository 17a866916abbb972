#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

use emad_console::commands::*;
use emad_console::config::{Config, DEFAULT_LOG_FILTER};
use emad_console::Store;
use log::info;
use tauri::Manager;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().filter_or("EMAD_LOG", DEFAULT_LOG_FILTER))
        .init();
    let config = Config::load();
    info!("Starting EMAD console (log filter: {})", config.log_filter);

    tauri::Builder::default()
        .plugin(tauri_plugin_opener::init())
        .plugin(tauri_plugin_clipboard_manager::init())
        .setup(move |app| {
            let data_dir = match config.data_dir.clone() {
                Some(dir) => dir,
                None => app.path().app_data_dir()?,
            };
            let store = Store::new(data_dir, config.pbkdf2_iterations)?;
            info!("Data directory: {}", store.root().display());
            app.manage(store);
            app.manage(config.clone());
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            app_version,
            storage_info,
            open_data_folder,
            auth_status,
            auth_setup,
            auth_verify,
            auth_change,
            db_validate,
            patients_list,
            patients_search,
            patients_get,
            patients_save,
            patients_delete,
            patients_by_status,
            patients_eligibility_queue,
            patients_decide_eligibility,
            copy_patient_summary,
            users_list,
            users_get,
            users_suggest_username,
            users_save,
            users_delete,
            users_login,
            users_change_password,
            users_reset_password,
            visits_list,
            visits_for_patient,
            visits_get,
            visits_save,
            visits_complete,
            visits_cancel,
            visits_delete,
            dashboard_report,
            dashboard_patient_profile,
            dashboard_overview,
            recycle_list,
            recycle_undo,
            recycle_purge,
            export_csv
        ])
        .run(tauri::generate_context!())
        .expect("failed to run EMAD console");
}
