//! Win32 implementations of the pipeline seams.
//!
//! Every wrapper here is one native call plus handle hygiene: handles are
//! RAII-guarded so modules, registry keys and log handles are released on
//! every exit path.

use std::ffi::{c_void, OsStr};
use std::os::windows::ffi::OsStrExt;
use std::path::Path;

use log::{debug, trace};
use windows::core::{PCWSTR, PWSTR};
use windows::Win32::Foundation::{
    GetLastError, ERROR_HANDLE_EOF, ERROR_INSUFFICIENT_BUFFER, ERROR_SUCCESS, HANDLE, HMODULE,
};
use windows::Win32::Security::{LookupAccountSidW, PSID, SID_NAME_USE};
use windows::Win32::System::Diagnostics::Debug::{
    FormatMessageW, FORMAT_MESSAGE_FROM_HMODULE, FORMAT_MESSAGE_IGNORE_INSERTS,
};
use windows::Win32::System::EventLog::{
    BackupEventLogW, CloseEventLog, DeregisterEventSource, EvtClose, EvtGetPublisherMetadataProperty,
    EvtOpenPublisherMetadata, EvtPublisherMetadataMessageFilePath,
    EvtPublisherMetadataParameterFilePath, GetNumberOfEventLogRecords, GetOldestEventLogRecord,
    OpenBackupEventLogW, OpenEventLogW, ReadEventLogW, RegisterEventSourceW, ReportEventW,
    EventLogHandle, EventSourceHandle, EVT_HANDLE, EVT_VARIANT, READ_EVENT_LOG_READ_FLAGS,
    REPORT_EVENT_TYPE,
};
use windows::Win32::System::LibraryLoader::{
    FreeLibrary, LoadLibraryExW, LOAD_LIBRARY_AS_DATAFILE, LOAD_LIBRARY_AS_IMAGE_RESOURCE,
};
use windows::Win32::System::Registry::{
    RegCloseKey, RegCreateKeyExW, RegOpenKeyExW, RegQueryValueExW, RegSetValueExW, HKEY,
    HKEY_LOCAL_MACHINE, KEY_QUERY_VALUE, KEY_SET_VALUE, REG_CREATED_NEW_KEY, REG_DWORD,
    REG_EXPAND_SZ, REG_OPTION_NON_VOLATILE, REG_VALUE_TYPE,
};

use super::{SourceConfig, SourceDisposition};
use crate::err::{EvtError, ReadError, Result};
use crate::evt_buffer::ReadFlags;
use crate::evt_reader::{EventLogApi, ResolutionContext};
use crate::message_resolver::{
    MessageModule, MessageProvider, PublisherCatalog, PublisherMetadata, RegistryKey, RegistryView,
    EVENTLOG_REGISTRY_ROOT,
};
use crate::record::EventType;
use crate::sid::AccountLookup;

fn to_wide(s: impl AsRef<OsStr>) -> Vec<u16> {
    s.as_ref().encode_wide().chain(std::iter::once(0)).collect()
}

fn opt_pcwstr(buf: &Option<Vec<u16>>) -> PCWSTR {
    match buf {
        Some(w) => PCWSTR(w.as_ptr()),
        None => PCWSTR::null(),
    }
}

fn win32_code(err: &windows::core::Error) -> u32 {
    (err.code().0 & 0xFFFF) as u32
}

fn os_err(op: &'static str, err: &windows::core::Error) -> EvtError {
    EvtError::Os {
        op,
        code: win32_code(err),
    }
}

/// An open handle to a live or backup event log.
pub struct EventLog {
    handle: EventLogHandle,
}

// The handle is only a kernel object reference; moving it across threads is
// fine, concurrent reads are the caller's responsibility (§ handle cursor).
unsafe impl Send for EventLog {}

impl EventLog {
    /// Opens a log by source name, on the local machine or `server`.
    pub fn open(server: Option<&str>, source: &str) -> Result<EventLog> {
        let server_w = server.map(to_wide);
        let source_w = to_wide(source);

        let handle = unsafe { OpenEventLogW(opt_pcwstr(&server_w), PCWSTR(source_w.as_ptr())) }
            .map_err(|e| os_err("OpenEventLog", &e))?;

        debug!("opened event log {source:?} on {server:?}");
        Ok(EventLog { handle })
    }

    /// Opens a backup log file previously produced by [`EventLog::backup`].
    pub fn open_backup(server: Option<&str>, file: &Path) -> Result<EventLog> {
        let server_w = server.map(to_wide);
        let file_w = to_wide(file);

        let handle =
            unsafe { OpenBackupEventLogW(opt_pcwstr(&server_w), PCWSTR(file_w.as_ptr())) }
                .map_err(|e| os_err("OpenBackupEventLog", &e))?;

        Ok(EventLog { handle })
    }

    /// Writes the whole log to `path` in backup format.
    pub fn backup(&mut self, path: &Path) -> Result<()> {
        let path_w = to_wide(path);
        unsafe { BackupEventLogW(self.handle, PCWSTR(path_w.as_ptr())) }
            .map_err(|e| os_err("BackupEventLog", &e))
    }
}

impl EventLogApi for EventLog {
    fn read(
        &mut self,
        flags: ReadFlags,
        record_offset: u32,
        buf: &mut [u8],
    ) -> std::result::Result<usize, ReadError> {
        let mut bytes_read = 0_u32;
        let mut min_bytes_needed = 0_u32;

        let outcome = unsafe {
            ReadEventLogW(
                self.handle,
                READ_EVENT_LOG_READ_FLAGS(flags.bits()),
                record_offset,
                buf.as_mut_ptr() as *mut c_void,
                buf.len() as u32,
                &mut bytes_read,
                &mut min_bytes_needed,
            )
        };

        match outcome {
            Ok(()) => Ok(bytes_read as usize),
            Err(e) => match win32_code(&e) {
                code if code == ERROR_INSUFFICIENT_BUFFER.0 => Err(ReadError::InsufficientBuffer {
                    needed: min_bytes_needed,
                }),
                code if code == ERROR_HANDLE_EOF.0 => Err(ReadError::EndOfLog),
                code => Err(ReadError::Os {
                    op: "ReadEventLog",
                    code,
                }),
            },
        }
    }

    fn record_count(&mut self) -> Result<u32> {
        let mut count = 0_u32;
        unsafe { GetNumberOfEventLogRecords(self.handle, &mut count) }
            .map_err(|e| os_err("GetNumberOfEventLogRecords", &e))?;
        Ok(count)
    }

    fn oldest_record_number(&mut self) -> Result<u32> {
        let mut oldest = 0_u32;
        unsafe { GetOldestEventLogRecord(self.handle, &mut oldest) }
            .map_err(|e| os_err("GetOldestEventLogRecord", &e))?;
        Ok(oldest)
    }
}

impl Drop for EventLog {
    fn drop(&mut self) {
        unsafe {
            let _ = CloseEventLog(self.handle);
        }
    }
}

/// `RegistryView` over the local machine hive.
pub struct WinRegistry;

struct WinRegistryKey {
    hkey: HKEY,
}

impl RegistryView for WinRegistry {
    fn open_key(&self, path: &str) -> Option<Box<dyn RegistryKey + '_>> {
        let path_w = to_wide(path);
        let mut hkey = HKEY::default();

        let status = unsafe {
            RegOpenKeyExW(
                HKEY_LOCAL_MACHINE,
                PCWSTR(path_w.as_ptr()),
                0,
                KEY_QUERY_VALUE,
                &mut hkey,
            )
        };

        if status != ERROR_SUCCESS {
            trace!("registry key {path:?} not found ({})", status.0);
            return None;
        }

        Some(Box::new(WinRegistryKey { hkey }))
    }
}

impl RegistryKey for WinRegistryKey {
    fn string_value(&self, name: &str) -> Option<String> {
        let name_w = to_wide(name);
        let mut value_type = REG_VALUE_TYPE::default();
        let mut size = 0_u32;

        let status = unsafe {
            RegQueryValueExW(
                self.hkey,
                PCWSTR(name_w.as_ptr()),
                None,
                Some(&mut value_type),
                None,
                Some(&mut size),
            )
        };
        if status != ERROR_SUCCESS || size == 0 {
            return None;
        }

        let mut data = vec![0_u8; size as usize];
        let status = unsafe {
            RegQueryValueExW(
                self.hkey,
                PCWSTR(name_w.as_ptr()),
                None,
                Some(&mut value_type),
                Some(data.as_mut_ptr()),
                Some(&mut size),
            )
        };
        if status != ERROR_SUCCESS {
            return None;
        }

        let wide: Vec<u16> = data[..size as usize]
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .take_while(|&unit| unit != 0)
            .collect();

        Some(String::from_utf16_lossy(&wide))
    }
}

impl Drop for WinRegistryKey {
    fn drop(&mut self) {
        unsafe {
            let _ = RegCloseKey(self.hkey);
        }
    }
}

/// `PublisherCatalog` over the live publisher metadata store.
pub struct WinPublisherCatalog;

impl PublisherCatalog for WinPublisherCatalog {
    fn open_publisher(&self, source: &str) -> Option<PublisherMetadata> {
        let source_w = to_wide(source);

        let metadata = unsafe {
            EvtOpenPublisherMetadata(
                EVT_HANDLE::default(),
                PCWSTR(source_w.as_ptr()),
                PCWSTR::null(),
                0,
                0,
            )
        }
        .ok()?;
        let metadata = EvtHandleGuard(metadata);

        Some(PublisherMetadata {
            parameter_file: publisher_string_property(
                metadata.0,
                EvtPublisherMetadataParameterFilePath,
            ),
            message_file: publisher_string_property(
                metadata.0,
                EvtPublisherMetadataMessageFilePath,
            ),
        })
    }
}

struct EvtHandleGuard(EVT_HANDLE);

impl Drop for EvtHandleGuard {
    fn drop(&mut self) {
        unsafe {
            let _ = EvtClose(self.0);
        }
    }
}

fn publisher_string_property(
    metadata: EVT_HANDLE,
    property: windows::Win32::System::EventLog::EVT_PUBLISHER_METADATA_PROPERTY_ID,
) -> Option<String> {
    let mut used = 0_u32;

    // Size probe; the call fails with ERROR_INSUFFICIENT_BUFFER and reports
    // the variant size it needs.
    let _ = unsafe { EvtGetPublisherMetadataProperty(metadata, property, 0, 0, None, &mut used) };
    if used == 0 {
        return None;
    }

    let mut buffer = vec![0_u8; used as usize];
    unsafe {
        EvtGetPublisherMetadataProperty(
            metadata,
            property,
            0,
            buffer.len() as u32,
            Some(buffer.as_mut_ptr() as *mut EVT_VARIANT),
            &mut used,
        )
    }
    .ok()?;

    let variant = unsafe { &*(buffer.as_ptr() as *const EVT_VARIANT) };
    let string_val = unsafe { variant.Anonymous.StringVal };
    if string_val.is_null() {
        return None;
    }

    unsafe { string_val.to_string() }.ok()
}

/// `MessageProvider` loading message files as data-only modules.
pub struct WinMessageProvider;

struct LoadedModule {
    module: HMODULE,
}

impl MessageProvider for WinMessageProvider {
    fn open_module(&self, path: &Path) -> Option<Box<dyn MessageModule + '_>> {
        let path_w = to_wide(path);

        let module = unsafe {
            LoadLibraryExW(
                PCWSTR(path_w.as_ptr()),
                HANDLE::default(),
                LOAD_LIBRARY_AS_DATAFILE | LOAD_LIBRARY_AS_IMAGE_RESOURCE,
            )
        }
        .ok()?;

        Some(Box::new(LoadedModule { module }))
    }
}

impl MessageModule for LoadedModule {
    fn message(&self, id: u32) -> Option<String> {
        // Most catalog messages fit comfortably; one growth step covers the
        // long ones.
        for capacity in [4 * 1024_usize, 64 * 1024] {
            let mut buffer = vec![0_u16; capacity];
            let written = unsafe {
                FormatMessageW(
                    FORMAT_MESSAGE_FROM_HMODULE | FORMAT_MESSAGE_IGNORE_INSERTS,
                    Some(self.module.0 as *const c_void),
                    id,
                    0,
                    PWSTR(buffer.as_mut_ptr()),
                    buffer.len() as u32,
                    None,
                )
            };

            if written > 0 {
                return Some(String::from_utf16_lossy(&buffer[..written as usize]));
            }

            if unsafe { GetLastError() } != ERROR_INSUFFICIENT_BUFFER {
                return None;
            }
        }

        None
    }
}

impl Drop for LoadedModule {
    fn drop(&mut self) {
        unsafe {
            let _ = FreeLibrary(self.module);
        }
    }
}

/// `AccountLookup` through `LookupAccountSid`.
pub struct WinAccountLookup;

impl AccountLookup for WinAccountLookup {
    fn lookup_account(&self, sid: &[u8]) -> Option<(String, String)> {
        let psid = PSID(sid.as_ptr() as *mut c_void);
        let mut name_len = 0_u32;
        let mut domain_len = 0_u32;
        let mut sid_use = SID_NAME_USE::default();

        // Size probe.
        let _ = unsafe {
            LookupAccountSidW(
                PCWSTR::null(),
                psid,
                PWSTR::null(),
                &mut name_len,
                PWSTR::null(),
                &mut domain_len,
                &mut sid_use,
            )
        };
        if name_len == 0 {
            return None;
        }

        let mut name = vec![0_u16; name_len as usize];
        let mut domain = vec![0_u16; domain_len.max(1) as usize];

        unsafe {
            LookupAccountSidW(
                PCWSTR::null(),
                psid,
                PWSTR(name.as_mut_ptr()),
                &mut name_len,
                PWSTR(domain.as_mut_ptr()),
                &mut domain_len,
                &mut sid_use,
            )
        }
        .ok()?;

        let trim = |units: &[u16]| {
            let end = units.iter().position(|&u| u == 0).unwrap_or(units.len());
            String::from_utf16_lossy(&units[..end])
        };

        Some((trim(&domain), trim(&name)))
    }
}

/// A registered source handle for writing events.
pub struct EventSource {
    handle: EventSourceHandle,
}

impl EventSource {
    pub fn register(server: Option<&str>, source: &str) -> Result<EventSource> {
        let server_w = server.map(to_wide);
        let source_w = to_wide(source);

        let handle =
            unsafe { RegisterEventSourceW(opt_pcwstr(&server_w), PCWSTR(source_w.as_ptr())) }
                .map_err(|e| os_err("RegisterEventSource", &e))?;

        Ok(EventSource { handle })
    }

    /// Writes one event (`ReportEvent`).
    pub fn report(
        &mut self,
        event_type: EventType,
        category: u16,
        event_id: u32,
        strings: &[&str],
        data: Option<&[u8]>,
    ) -> Result<()> {
        let wide_strings: Vec<Vec<u16>> = strings.iter().map(to_wide).collect();
        let string_ptrs: Vec<PCWSTR> =
            wide_strings.iter().map(|w| PCWSTR(w.as_ptr())).collect();

        unsafe {
            ReportEventW(
                self.handle,
                REPORT_EVENT_TYPE(event_type.as_code()),
                category,
                event_id,
                PSID::default(),
                data.map_or(0, |d| d.len() as u32),
                Some(&string_ptrs),
                data.map(|d| d.as_ptr() as *const c_void),
            )
        }
        .map_err(|e| os_err("ReportEvent", &e))
    }
}

impl Drop for EventSource {
    fn drop(&mut self) {
        unsafe {
            let _ = DeregisterEventSource(self.handle);
        }
    }
}

/// Registers an event source in the registry, writing its message-file and
/// type-support values. Returns whether the key was created or already
/// present.
pub fn register_source(
    server: Option<&str>,
    log: &str,
    source: &str,
    config: &SourceConfig,
) -> Result<SourceDisposition> {
    // Remote registration would go through RegConnectRegistry; only the
    // local hive is wired up.
    if server.is_some() {
        return Err(EvtError::Unsupported);
    }

    let path = format!("{EVENTLOG_REGISTRY_ROOT}\\{log}\\{source}");
    let path_w = to_wide(path.as_str());

    let mut hkey = HKEY::default();
    let mut disposition = windows::Win32::System::Registry::REG_CREATE_KEY_DISPOSITION::default();

    let status = unsafe {
        RegCreateKeyExW(
            HKEY_LOCAL_MACHINE,
            PCWSTR(path_w.as_ptr()),
            0,
            PCWSTR::null(),
            REG_OPTION_NON_VOLATILE,
            KEY_SET_VALUE,
            None,
            &mut hkey,
            Some(&mut disposition),
        )
    };
    if status != ERROR_SUCCESS {
        return Err(EvtError::Os {
            op: "RegCreateKeyEx",
            code: status.0,
        });
    }
    let key = WinRegistryKey { hkey };

    let set_files = |name: &str, files: &[String]| -> Result<()> {
        if files.is_empty() {
            return Ok(());
        }
        let joined = files.join(";");
        let value: Vec<u8> = to_wide(joined.as_str())
            .into_iter()
            .flat_map(u16::to_le_bytes)
            .collect();
        set_value(key.hkey, name, REG_EXPAND_SZ, &value)
    };

    set_files("EventMessageFile", &config.event_message_files)?;
    set_files("ParameterMessageFile", &config.parameter_message_files)?;
    set_files("CategoryMessageFile", &config.category_message_files)?;
    set_value(
        key.hkey,
        "CategoryCount",
        REG_DWORD,
        &config.category_count.to_le_bytes(),
    )?;
    set_value(
        key.hkey,
        "TypesSupported",
        REG_DWORD,
        &config.types_supported.to_le_bytes(),
    )?;

    Ok(if disposition == REG_CREATED_NEW_KEY {
        SourceDisposition::CreatedNew
    } else {
        SourceDisposition::OpenedExisting
    })
}

fn set_value(hkey: HKEY, name: &str, value_type: REG_VALUE_TYPE, data: &[u8]) -> Result<()> {
    let name_w = to_wide(name);
    let status =
        unsafe { RegSetValueExW(hkey, PCWSTR(name_w.as_ptr()), 0, value_type, Some(data)) };
    if status != ERROR_SUCCESS {
        return Err(EvtError::Os {
            op: "RegSetValueEx",
            code: status.0,
        });
    }
    Ok(())
}

/// The live resolution seams: local registry, publisher metadata, message
/// modules and account lookup.
pub fn system_context() -> ResolutionContext {
    ResolutionContext {
        registry: Box::new(WinRegistry),
        publishers: Box::new(WinPublisherCatalog),
        messages: Box::new(WinMessageProvider),
        accounts: Box::new(WinAccountLookup),
    }
}
