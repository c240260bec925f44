//! Windows registry backend.
//!
//! Entries live under `HKEY_CURRENT_USER`. Change notifications use
//! `RegNotifyChangeKeyValue` in asynchronous mode with an event object, so a
//! wait can be bounded and the watcher can observe cancellation between waits.

#![allow(unsafe_code)]

use super::{ChangeNotification, ChildEntry, ConfigStore, WaitOutcome};
use crate::entry::EntryId;
use crate::error::{MonitorError, Result};
use std::ffi::OsStr;
use std::os::windows::ffi::OsStrExt;
use std::ptr;
use std::time::Duration;
use windows_sys::Win32::Foundation::{
    CloseHandle, ERROR_ACCESS_DENIED, ERROR_FILE_NOT_FOUND, ERROR_MORE_DATA,
    ERROR_NO_MORE_ITEMS, ERROR_SUCCESS, HANDLE, WAIT_OBJECT_0, WAIT_TIMEOUT, WIN32_ERROR,
};
use windows_sys::Win32::System::Registry::{
    HKEY, HKEY_CURRENT_USER, KEY_ENUMERATE_SUB_KEYS, KEY_NOTIFY, KEY_QUERY_VALUE,
    REG_NOTIFY_CHANGE_LAST_SET, REG_NOTIFY_THREAD_AGNOSTIC, RRF_RT_DWORD, RRF_RT_QWORD, RegCloseKey, RegEnumKeyExW,
    RegGetValueW, RegNotifyChangeKeyValue, RegOpenKeyExW,
};
use windows_sys::Win32::System::Threading::{CreateEventW, WaitForSingleObject};

/// Longest key name the registry allows, plus the terminator.
const MAX_KEY_NAME: usize = 256;

/// Registry-backed store rooted at `HKEY_CURRENT_USER`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RegistryStore;

impl RegistryStore {
    /// Create a store over the current user's hive.
    pub fn new() -> Self {
        Self
    }
}

fn wide(s: &str) -> Vec<u16> {
    OsStr::new(s).encode_wide().chain(std::iter::once(0)).collect()
}

/// Open registry key, closed on drop.
struct OwnedKey(HKEY);

impl OwnedKey {
    fn open(path: &str, access: u32) -> std::result::Result<Self, WIN32_ERROR> {
        let path = wide(path);
        let mut key: HKEY = 0;
        let status = unsafe { RegOpenKeyExW(HKEY_CURRENT_USER, path.as_ptr(), 0, access, &mut key) };
        if status == ERROR_SUCCESS {
            Ok(Self(key))
        } else {
            Err(status)
        }
    }
}

impl Drop for OwnedKey {
    fn drop(&mut self) {
        unsafe {
            RegCloseKey(self.0);
        }
    }
}

/// Event object, closed on drop.
struct OwnedEvent(HANDLE);

impl OwnedEvent {
    fn new() -> std::io::Result<Self> {
        // Manual reset, initially unsignalled, unnamed.
        let handle = unsafe { CreateEventW(ptr::null(), 1, 0, ptr::null()) };
        if handle == 0 {
            Err(std::io::Error::last_os_error())
        } else {
            Ok(Self(handle))
        }
    }
}

impl Drop for OwnedEvent {
    fn drop(&mut self) {
        unsafe {
            CloseHandle(self.0);
        }
    }
}

fn describe(status: WIN32_ERROR) -> String {
    std::io::Error::from_raw_os_error(status as i32).to_string()
}

impl ConfigStore for RegistryStore {
    fn enumerate_children(&self, root: &str) -> Result<Vec<ChildEntry>> {
        let key = OwnedKey::open(root, KEY_ENUMERATE_SUB_KEYS).map_err(|status| {
            MonitorError::Enumeration {
                root: root.to_string(),
                reason: describe(status),
            }
        })?;

        let mut children = Vec::new();
        let mut index = 0u32;
        loop {
            let mut name = [0u16; MAX_KEY_NAME];
            let mut len = name.len() as u32;
            let status = unsafe {
                RegEnumKeyExW(
                    key.0,
                    index,
                    name.as_mut_ptr(),
                    &mut len,
                    ptr::null(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                    ptr::null_mut(),
                )
            };
            index += 1;

            match status {
                ERROR_SUCCESS => {}
                ERROR_NO_MORE_ITEMS => break,
                ERROR_MORE_DATA => {
                    tracing::debug!(root, index, "Skipping child with oversized name");
                    continue;
                }
                other => {
                    tracing::debug!(root, index, error = %describe(other), "Skipping unreadable child");
                    continue;
                }
            }

            let child = String::from_utf16_lossy(&name[..len as usize]);
            let id = EntryId::child_of(root, &child);

            // Probe with the rights a watcher needs so unreadable children are
            // reported here rather than failing later inside a watcher.
            match OwnedKey::open(id.as_str(), KEY_NOTIFY | KEY_QUERY_VALUE) {
                Ok(_probe) => children.push(ChildEntry::Readable(id)),
                Err(status) => children.push(ChildEntry::Unreadable {
                    path: id.to_string(),
                    reason: describe(status),
                }),
            }
        }

        Ok(children)
    }

    fn read_value(&self, entry: &EntryId, value_name: &str) -> Result<u64> {
        let path = wide(entry.as_str());
        let name = wide(value_name);
        let mut data = 0u64;
        let mut size = std::mem::size_of::<u64>() as u32;

        let status = unsafe {
            RegGetValueW(
                HKEY_CURRENT_USER,
                path.as_ptr(),
                name.as_ptr(),
                RRF_RT_QWORD | RRF_RT_DWORD,
                ptr::null_mut(),
                (&mut data as *mut u64).cast(),
                &mut size,
            )
        };

        match status {
            ERROR_SUCCESS if size == 4 => Ok(data & u64::from(u32::MAX)),
            ERROR_SUCCESS => Ok(data),
            // Reported both for a missing key and for a missing value.
            ERROR_FILE_NOT_FOUND => match OwnedKey::open(entry.as_str(), KEY_QUERY_VALUE) {
                Ok(_) => Err(MonitorError::ValueMissing {
                    entry: entry.to_string(),
                    value: value_name.to_string(),
                }),
                Err(ERROR_FILE_NOT_FOUND) => Err(MonitorError::EntryNotFound(entry.to_string())),
                Err(other) => Err(MonitorError::Read {
                    entry: entry.to_string(),
                    reason: describe(other),
                }),
            },
            ERROR_ACCESS_DENIED => Err(MonitorError::AccessDenied(entry.to_string())),
            other => Err(MonitorError::Read {
                entry: entry.to_string(),
                reason: describe(other),
            }),
        }
    }

    fn register_change_notification(
        &self,
        entry: &EntryId,
    ) -> Result<Box<dyn ChangeNotification>> {
        let key = OwnedKey::open(entry.as_str(), KEY_NOTIFY).map_err(|status| match status {
            ERROR_FILE_NOT_FOUND => MonitorError::EntryNotFound(entry.to_string()),
            other => MonitorError::Registration {
                entry: entry.to_string(),
                reason: describe(other),
            },
        })?;

        let event = OwnedEvent::new().map_err(|e| MonitorError::Registration {
            entry: entry.to_string(),
            reason: e.to_string(),
        })?;

        // Thread agnostic: the registration survives the exit of the thread
        // that made it instead of signalling the event.
        let filter = REG_NOTIFY_CHANGE_LAST_SET | REG_NOTIFY_THREAD_AGNOSTIC;
        let status = unsafe { RegNotifyChangeKeyValue(key.0, 0, filter, event.0, 1) };
        if status != ERROR_SUCCESS {
            return Err(MonitorError::Registration {
                entry: entry.to_string(),
                reason: describe(status),
            });
        }

        Ok(Box::new(RegistryNotification {
            entry: entry.clone(),
            _key: key,
            event,
        }))
    }

    fn name(&self) -> String {
        "registry:HKEY_CURRENT_USER".to_string()
    }
}

/// Live `RegNotifyChangeKeyValue` registration.
///
/// Field order matters: the key is closed before the event so the registration
/// is torn down while its event is still valid.
struct RegistryNotification {
    entry: EntryId,
    _key: OwnedKey,
    event: OwnedEvent,
}

impl ChangeNotification for RegistryNotification {
    fn wait(&mut self, timeout: Duration) -> Result<WaitOutcome> {
        let millis = u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX - 1);
        match unsafe { WaitForSingleObject(self.event.0, millis) } {
            WAIT_OBJECT_0 => Ok(WaitOutcome::Fired),
            WAIT_TIMEOUT => Ok(WaitOutcome::TimedOut),
            _ => Err(MonitorError::Wait {
                entry: self.entry.to_string(),
                reason: std::io::Error::last_os_error().to_string(),
            }),
        }
    }
}
