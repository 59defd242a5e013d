// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! LiveSync plugin settings carried inside a setup bundle.
//!
//! The client imports this object verbatim, so field names and their order
//! follow the plugin's own settings schema.

use serde::{Deserialize, Serialize};

/// Connection values a bundle is built around.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub couchdb_uri: String,
    pub couchdb_user: String,
    /// The device credential, presented by the client as its Basic-auth password
    pub couchdb_password: String,
    pub couchdb_dbname: String,
    pub device_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LiveSyncSettings {
    #[serde(rename = "couchDB_URI")]
    pub couchdb_uri: String,
    #[serde(rename = "couchDB_USER")]
    pub couchdb_user: String,
    #[serde(rename = "couchDB_PASSWORD")]
    pub couchdb_password: String,
    #[serde(rename = "couchDB_DBNAME")]
    pub couchdb_dbname: String,
    pub live_sync: bool,
    pub sync_on_save: bool,
    pub sync_on_start: bool,
    pub saving_delay: u32,
    pub less_information_in_log: bool,
    pub gc_delay: u32,
    pub version_up_flash: String,
    pub minimum_chunk_size: u32,
    pub long_line_threshold: u32,
    pub show_own_plugin_update_notice: bool,
    pub show_regular_notification_on_mobile: bool,
    pub batch_save: bool,
    pub device_and_vault_name: String,
    pub use_plugin_settings: bool,
    pub show_status_on_editor: bool,
    pub show_status_on_statusbar: bool,
    pub show_only_icons_on_editor: bool,
    pub use_plugin_sync: bool,
    pub auto_sweep_plugins: bool,
    pub auto_sweep_plugins_periodic: bool,
    pub notify_plugin_or_setting_updated: bool,
    pub check_integrity_on_save: bool,
    #[serde(rename = "batch_size")]
    pub batch_size: u32,
    #[serde(rename = "batches_limit")]
    pub batches_limit: u32,
    pub use_history: bool,
    #[serde(rename = "disableRequestURI")]
    pub disable_request_uri: bool,
    pub skip_older_files_on_sync: bool,
    pub check_conflict_only_on_open: bool,
    pub sync_internal_files: bool,
    pub sync_internal_files_before_replication: bool,
    pub sync_internal_files_ignore_patterns: String,
    pub sync_internal_files_interval: u32,
    pub additional_suffix_of_database_name: String,
    pub ignore_version_check: bool,
    pub last_read_updates: String,
    pub delete_metadata_of_deleted_files: bool,
    #[serde(rename = "syncIgnoreRegEx")]
    pub sync_ignore_regex: String,
    #[serde(rename = "syncOnlyRegEx")]
    pub sync_only_regex: String,
    pub custom_chunk_size: u32,
    pub read_chunks_online: bool,
    pub watch_internal_file_changes: bool,
    pub trash_instead_delete: bool,
    pub periodic_replication: bool,
    pub periodic_replication_interval: u32,
    pub sync_after_merge: bool,
    pub config_passphrase_store: String,
    pub encrypted_passphrase: String,
    #[serde(rename = "encryptedCouchDBConnection")]
    pub encrypted_couchdb_connection: String,
    pub permit_empty_passphrase: bool,
    #[serde(rename = "useIndexedDBAdapter")]
    pub use_indexed_db_adapter: bool,
    #[serde(rename = "useTimeoutAPI")]
    pub use_timeout_api: bool,
    pub write_log_to_the_file: bool,
    pub do_not_pace_replication: bool,
    pub hash_cache_max_count: u32,
    pub hash_cache_max_amount: u32,
    pub concurrency_of_read_chunks_online: u32,
    pub minimum_interval_of_read_chunks_online: u32,
    pub hash_alg: String,
    pub encrypt: bool,
    pub passphrase: String,
    pub use_path_obfuscation: bool,
}

impl LiveSyncSettings {
    /// Settings for a freshly onboarded device.
    ///
    /// `content_passphrase` turns on vault encryption; without it `encrypt`,
    /// `passphrase`, and `usePathObfuscation` are all cleared.
    pub fn new(
        connection: ConnectionSettings,
        content_passphrase: Option<&str>,
        path_obfuscation: bool,
    ) -> Self {
        let (encrypt, passphrase, use_path_obfuscation) = match content_passphrase {
            Some(p) if !p.is_empty() => (true, p.to_string(), path_obfuscation),
            _ => (false, String::new(), false),
        };

        Self {
            couchdb_uri: connection.couchdb_uri,
            couchdb_user: connection.couchdb_user,
            couchdb_password: connection.couchdb_password,
            couchdb_dbname: connection.couchdb_dbname,
            live_sync: false,
            sync_on_save: false,
            sync_on_start: true,
            saving_delay: 200,
            less_information_in_log: false,
            gc_delay: 0,
            version_up_flash: String::new(),
            minimum_chunk_size: 20,
            long_line_threshold: 250,
            show_own_plugin_update_notice: false,
            show_regular_notification_on_mobile: false,
            batch_save: false,
            device_and_vault_name: connection.device_name,
            use_plugin_settings: false,
            show_status_on_editor: true,
            show_status_on_statusbar: true,
            show_only_icons_on_editor: false,
            use_plugin_sync: false,
            auto_sweep_plugins: false,
            auto_sweep_plugins_periodic: false,
            notify_plugin_or_setting_updated: false,
            check_integrity_on_save: false,
            batch_size: 50,
            batches_limit: 50,
            use_history: false,
            disable_request_uri: true,
            skip_older_files_on_sync: true,
            check_conflict_only_on_open: false,
            sync_internal_files: false,
            sync_internal_files_before_replication: false,
            sync_internal_files_ignore_patterns:
                r"\/node_modules\/, \/\.git\/, \/obsidian-livesync\/".to_string(),
            sync_internal_files_interval: 60,
            additional_suffix_of_database_name: String::new(),
            ignore_version_check: false,
            last_read_updates: String::new(),
            delete_metadata_of_deleted_files: false,
            sync_ignore_regex: String::new(),
            sync_only_regex: String::new(),
            custom_chunk_size: 0,
            read_chunks_online: true,
            watch_internal_file_changes: true,
            trash_instead_delete: true,
            periodic_replication: false,
            periodic_replication_interval: 60,
            sync_after_merge: false,
            config_passphrase_store: String::new(),
            encrypted_passphrase: String::new(),
            encrypted_couchdb_connection: String::new(),
            permit_empty_passphrase: false,
            use_indexed_db_adapter: false,
            use_timeout_api: false,
            write_log_to_the_file: false,
            do_not_pace_replication: false,
            hash_cache_max_count: 300,
            hash_cache_max_amount: 50,
            concurrency_of_read_chunks_online: 30,
            minimum_interval_of_read_chunks_online: 333,
            hash_alg: "xxhash64".to_string(),
            encrypt,
            passphrase,
            use_path_obfuscation,
        }
    }
}
