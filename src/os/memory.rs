//! In-memory OS backends
//!
//! Deterministic stand-ins for the host initiator, disk subsystem and service
//! manager. They enforce the same rules a Windows host does where the proxy
//! depends on them: logins check CHAP material, sessions block portal removal,
//! unknown disks are errors, and a disk can only be partitioned once.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{
    ConnectCredentials, DiskOsApi, IscsiOsApi, OsError, OsResult, ServiceInfo, SystemOsApi,
    VolumeOsApi, VolumeStats,
};
use crate::config::MemoryConfig;
use crate::iscsi::{AuthType, TargetPortal};
use crate::system::{ServiceStatus, StartType, ISCSI_INITIATOR_SERVICE};

const DEFAULT_VOLUME_SIZE: u64 = 1 << 30;
const DEFAULT_VOLUME_MAX_SIZE: u64 = 4 << 30;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A target exposed on a portal
#[derive(Debug, Clone)]
pub struct MemoryTarget {
    pub portal: TargetPortal,
    pub iqn: String,
    pub disks: Vec<String>,
    /// Username and secret the target expects from the initiator
    pub chap: Option<(String, String)>,
    /// Secret the initiator expects from the target
    pub mutual_secret: Option<String>,
}

impl MemoryTarget {
    pub fn new(portal: TargetPortal, iqn: impl Into<String>) -> Self {
        Self {
            portal: portal.normalized(),
            iqn: iqn.into(),
            disks: Vec::new(),
            chap: None,
            mutual_secret: None,
        }
    }

    pub fn with_disks<I, S>(mut self, disks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.disks = disks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_chap(mut self, username: impl Into<String>, secret: impl Into<String>) -> Self {
        self.chap = Some((username.into(), secret.into()));
        self
    }

    pub fn with_mutual_secret(mut self, secret: impl Into<String>) -> Self {
        self.mutual_secret = Some(secret.into());
        self
    }

    fn required_auth(&self) -> AuthType {
        match (&self.chap, &self.mutual_secret) {
            (None, _) => AuthType::None,
            (Some(_), None) => AuthType::OneWayChap,
            (Some(_), Some(_)) => AuthType::MutualChap,
        }
    }

    fn authenticate(&self, credentials: &ConnectCredentials) -> OsResult<()> {
        let required = self.required_auth();
        if credentials.auth_type != required {
            return Err(OsError::Authentication(format!(
                "target {} requires {:?}, initiator offered {:?}",
                self.iqn, required, credentials.auth_type
            )));
        }

        if let Some((username, secret)) = &self.chap {
            if credentials.username != *username || credentials.secret != *secret {
                return Err(OsError::Authentication(format!(
                    "CHAP response rejected by target {}",
                    self.iqn
                )));
            }
        }

        if let Some(expected) = &self.mutual_secret {
            if credentials.mutual_secret.as_deref() != Some(expected.as_str()) {
                return Err(OsError::Authentication(format!(
                    "target {} failed mutual CHAP verification",
                    self.iqn
                )));
            }
        }

        Ok(())
    }
}

#[derive(Debug, Default)]
struct IscsiState {
    portals: Vec<TargetPortal>,
    targets: Vec<MemoryTarget>,
    sessions: Vec<(TargetPortal, String)>,
    initiator_secret: Option<String>,
    failures: Vec<(String, String)>,
}

impl IscsiState {
    fn take_failure(&mut self, operation: &str) -> OsResult<()> {
        match self.failures.iter().position(|(op, _)| op == operation) {
            Some(index) => Err(OsError::Command(self.failures.remove(index).1)),
            None => Ok(()),
        }
    }

    fn is_registered(&self, portal: &TargetPortal) -> bool {
        self.portals.iter().any(|p| p.is_same(portal))
    }

    fn session_index(&self, portal: &TargetPortal, iqn: &str) -> Option<usize> {
        self.sessions
            .iter()
            .position(|(p, i)| p.is_same(portal) && i == iqn)
    }
}

/// Simulated iSCSI initiator
#[derive(Debug, Default)]
pub struct MemoryIscsi {
    state: Mutex<IscsiState>,
}

impl MemoryIscsi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed targets from configuration
    pub fn from_config(config: &MemoryConfig) -> Self {
        let iscsi = Self::new();
        for target in &config.target {
            let mut seeded = MemoryTarget::new(
                TargetPortal::new(target.address.clone(), target.port),
                target.iqn.clone(),
            )
            .with_disks(target.disks.iter().cloned());
            if let (Some(username), Some(secret)) = (&target.chap_username, &target.chap_secret) {
                seeded = seeded.with_chap(username.clone(), secret.clone());
            }
            if let Some(mutual) = &target.mutual_secret {
                seeded = seeded.with_mutual_secret(mutual.clone());
            }
            iscsi.expose(seeded);
        }
        iscsi
    }

    pub fn with_target(self, target: MemoryTarget) -> Self {
        self.expose(target);
        self
    }

    /// Make a target reachable through its portal
    pub fn expose(&self, target: MemoryTarget) {
        lock(&self.state).targets.push(target);
    }

    /// Make the next call of `operation` fail with `message`
    pub fn fail_next(&self, operation: &str, message: &str) {
        lock(&self.state)
            .failures
            .push((operation.to_string(), message.to_string()));
    }

    pub fn is_connected(&self, portal: &TargetPortal, iqn: &str) -> bool {
        lock(&self.state).session_index(portal, iqn).is_some()
    }

    pub fn session_count(&self) -> usize {
        lock(&self.state).sessions.len()
    }

    /// Mutual secret currently installed on the initiator
    pub fn initiator_mutual_secret(&self) -> Option<String> {
        lock(&self.state).initiator_secret.clone()
    }
}

impl IscsiOsApi for MemoryIscsi {
    fn add_target_portal(&self, portal: &TargetPortal) -> OsResult<()> {
        let mut state = lock(&self.state);
        state.take_failure("add_target_portal")?;
        if !state.is_registered(portal) {
            state.portals.push(portal.normalized());
        }
        Ok(())
    }

    fn list_target_portals(&self) -> OsResult<Vec<TargetPortal>> {
        let mut state = lock(&self.state);
        state.take_failure("list_target_portals")?;
        Ok(state.portals.clone())
    }

    fn remove_target_portal(&self, portal: &TargetPortal) -> OsResult<()> {
        let mut state = lock(&self.state);
        state.take_failure("remove_target_portal")?;
        let index = state
            .portals
            .iter()
            .position(|p| p.is_same(portal))
            .ok_or_else(|| OsError::NotFound(format!("target portal {}", portal)))?;
        if state.sessions.iter().any(|(p, _)| p.is_same(portal)) {
            return Err(OsError::Busy(format!(
                "target portal {} has active sessions",
                portal
            )));
        }
        state.portals.remove(index);
        Ok(())
    }

    fn discover_target_portal(&self, portal: &TargetPortal) -> OsResult<Vec<String>> {
        let mut state = lock(&self.state);
        state.take_failure("discover_target_portal")?;
        if !state.is_registered(portal) {
            return Err(OsError::NotFound(format!("target portal {}", portal)));
        }
        Ok(state
            .targets
            .iter()
            .filter(|t| t.portal.is_same(portal))
            .map(|t| t.iqn.clone())
            .collect())
    }

    fn connect_target(
        &self,
        portal: &TargetPortal,
        iqn: &str,
        credentials: &ConnectCredentials,
    ) -> OsResult<()> {
        let mut state = lock(&self.state);
        state.take_failure("connect_target")?;
        if !state.is_registered(portal) {
            return Err(OsError::NotFound(format!("target portal {}", portal)));
        }
        let target = state
            .targets
            .iter()
            .find(|t| t.portal.is_same(portal) && t.iqn == iqn)
            .ok_or_else(|| OsError::NotFound(format!("target {} on {}", iqn, portal)))?;
        target.authenticate(credentials)?;

        if state.session_index(portal, iqn).is_some() {
            return Err(OsError::AlreadyExists(format!(
                "session to {} via {}",
                iqn, portal
            )));
        }
        state.sessions.push((portal.normalized(), iqn.to_string()));
        Ok(())
    }

    fn disconnect_target(&self, portal: &TargetPortal, iqn: &str) -> OsResult<()> {
        let mut state = lock(&self.state);
        state.take_failure("disconnect_target")?;
        let index = state
            .session_index(portal, iqn)
            .ok_or_else(|| OsError::NotFound(format!("session to {} via {}", iqn, portal)))?;
        state.sessions.remove(index);
        Ok(())
    }

    fn get_target_disks(&self, portal: &TargetPortal, iqn: &str) -> OsResult<Vec<String>> {
        let mut state = lock(&self.state);
        state.take_failure("get_target_disks")?;
        if state.session_index(portal, iqn).is_none() {
            return Err(OsError::NotFound(format!("session to {} via {}", iqn, portal)));
        }
        Ok(state
            .targets
            .iter()
            .find(|t| t.portal.is_same(portal) && t.iqn == iqn)
            .map(|t| t.disks.clone())
            .unwrap_or_default())
    }

    fn set_mutual_chap_secret(&self, secret: &str) -> OsResult<()> {
        let mut state = lock(&self.state);
        state.take_failure("set_mutual_chap_secret")?;
        state.initiator_secret = Some(secret.to_string());
        Ok(())
    }
}

/// A simulated disk
#[derive(Debug, Clone)]
pub struct MemoryDisk {
    pub online: bool,
    pub partitioned: bool,
    pub volumes: Vec<String>,
}

/// A simulated volume
#[derive(Debug, Clone)]
pub struct MemoryVolume {
    pub disk_number: u32,
    pub filesystem: Option<String>,
    pub size_bytes: u64,
    pub max_size_bytes: u64,
    pub used_bytes: u64,
    pub mounts: Vec<String>,
    pub cache_flushes: u32,
}

impl MemoryVolume {
    fn new(disk_number: u32) -> Self {
        Self {
            disk_number,
            filesystem: None,
            size_bytes: DEFAULT_VOLUME_SIZE,
            max_size_bytes: DEFAULT_VOLUME_MAX_SIZE,
            used_bytes: 0,
            mounts: Vec::new(),
            cache_flushes: 0,
        }
    }
}

#[derive(Debug, Default)]
struct StorageState {
    disks: BTreeMap<u32, MemoryDisk>,
    volumes: BTreeMap<String, MemoryVolume>,
}

impl StorageState {
    fn disk_mut(&mut self, disk_number: u32) -> OsResult<&mut MemoryDisk> {
        self.disks
            .get_mut(&disk_number)
            .ok_or_else(|| OsError::NotFound(format!("disk {}", disk_number)))
    }

    fn volume_mut(&mut self, volume_id: &str) -> OsResult<&mut MemoryVolume> {
        self.volumes
            .get_mut(volume_id)
            .ok_or_else(|| OsError::NotFound(format!("volume {}", volume_id)))
    }
}

/// Simulated disks and volumes
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<StorageState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed disks from configuration
    pub fn from_config(config: &MemoryConfig) -> Self {
        let storage = Self::new();
        for disk in &config.disk {
            let volumes: Vec<&str> = disk.volumes.iter().map(String::as_str).collect();
            storage.add_disk(disk.number, disk.online, &volumes);
        }
        storage
    }

    /// Add an online disk. A disk with volumes counts as partitioned.
    pub fn with_disk(self, disk_number: u32, volumes: &[&str]) -> Self {
        self.add_disk(disk_number, true, volumes);
        self
    }

    /// Add an offline, blank disk
    pub fn with_offline_disk(self, disk_number: u32) -> Self {
        self.add_disk(disk_number, false, &[]);
        self
    }

    pub fn add_disk(&self, disk_number: u32, online: bool, volumes: &[&str]) {
        let mut state = lock(&self.state);
        for volume in volumes {
            state
                .volumes
                .insert(volume.to_string(), MemoryVolume::new(disk_number));
        }
        state.disks.insert(
            disk_number,
            MemoryDisk {
                online,
                partitioned: !volumes.is_empty(),
                volumes: volumes.iter().map(|v| v.to_string()).collect(),
            },
        );
    }

    pub fn disk(&self, disk_number: u32) -> Option<MemoryDisk> {
        lock(&self.state).disks.get(&disk_number).cloned()
    }

    pub fn volume(&self, volume_id: &str) -> Option<MemoryVolume> {
        lock(&self.state).volumes.get(volume_id).cloned()
    }
}

impl DiskOsApi for MemoryStorage {
    fn get_disk_state(&self, disk_number: u32) -> OsResult<bool> {
        Ok(lock(&self.state).disk_mut(disk_number)?.online)
    }

    fn set_disk_state(&self, disk_number: u32, is_online: bool) -> OsResult<()> {
        lock(&self.state).disk_mut(disk_number)?.online = is_online;
        Ok(())
    }

    fn partition_disk(&self, disk_number: u32) -> OsResult<()> {
        let mut state = lock(&self.state);
        let disk = state.disk_mut(disk_number)?;
        if !disk.online {
            return Err(OsError::Command(format!("disk {} is offline", disk_number)));
        }
        if disk.partitioned {
            return Err(OsError::AlreadyExists(format!(
                "disk {} is already initialized",
                disk_number
            )));
        }
        let volume_id = format!("disk{}-vol{}", disk_number, disk.volumes.len() + 1);
        disk.partitioned = true;
        disk.volumes.push(volume_id.clone());
        state.volumes.insert(volume_id, MemoryVolume::new(disk_number));
        Ok(())
    }
}

impl VolumeOsApi for MemoryStorage {
    fn list_volumes_on_disk(&self, disk_number: u32) -> OsResult<Vec<String>> {
        Ok(lock(&self.state).disk_mut(disk_number)?.volumes.clone())
    }

    fn is_volume_formatted(&self, volume_id: &str) -> OsResult<bool> {
        Ok(lock(&self.state).volume_mut(volume_id)?.filesystem.is_some())
    }

    fn format_volume(&self, volume_id: &str, filesystem: &str) -> OsResult<()> {
        let mut state = lock(&self.state);
        let volume = state.volume_mut(volume_id)?;
        volume.filesystem = Some(filesystem.to_string());
        volume.used_bytes = 0;
        Ok(())
    }

    fn mount_volume(&self, volume_id: &str, target_path: &str) -> OsResult<()> {
        let mut state = lock(&self.state);
        if state
            .volumes
            .values()
            .any(|v| v.mounts.iter().any(|m| m == target_path))
        {
            return Err(OsError::AlreadyExists(format!(
                "access path {} is in use",
                target_path
            )));
        }
        state
            .volume_mut(volume_id)?
            .mounts
            .push(target_path.to_string());
        Ok(())
    }

    fn unmount_volume(&self, volume_id: &str, target_path: &str) -> OsResult<()> {
        let mut state = lock(&self.state);
        let volume = state.volume_mut(volume_id)?;
        let index = volume
            .mounts
            .iter()
            .position(|m| m == target_path)
            .ok_or_else(|| {
                OsError::NotFound(format!("access path {} on volume {}", target_path, volume_id))
            })?;
        volume.mounts.remove(index);
        Ok(())
    }

    fn resize_volume(&self, volume_id: &str, size_bytes: u64) -> OsResult<()> {
        let mut state = lock(&self.state);
        let volume = state.volume_mut(volume_id)?;
        let target = if size_bytes == 0 {
            volume.max_size_bytes
        } else {
            size_bytes
        };
        if target > volume.max_size_bytes {
            return Err(OsError::Command(format!(
                "size {} exceeds maximum {} for volume {}",
                target, volume.max_size_bytes, volume_id
            )));
        }
        if target < volume.used_bytes {
            return Err(OsError::Command(format!(
                "size {} is below used space {} for volume {}",
                target, volume.used_bytes, volume_id
            )));
        }
        volume.size_bytes = target;
        Ok(())
    }

    fn get_volume_stats(&self, volume_id: &str) -> OsResult<VolumeStats> {
        let mut state = lock(&self.state);
        let volume = state.volume_mut(volume_id)?;
        Ok(VolumeStats {
            total_bytes: volume.size_bytes,
            used_bytes: volume.used_bytes,
        })
    }

    fn write_volume_cache(&self, volume_id: &str) -> OsResult<()> {
        lock(&self.state).volume_mut(volume_id)?.cache_flushes += 1;
        Ok(())
    }

    fn get_disk_number_from_volume_id(&self, volume_id: &str) -> OsResult<u32> {
        Ok(lock(&self.state).volume_mut(volume_id)?.disk_number)
    }

    fn get_volume_id_from_target_path(&self, target_path: &str) -> OsResult<String> {
        lock(&self.state)
            .volumes
            .iter()
            .find(|(_, v)| v.mounts.iter().any(|m| m == target_path))
            .map(|(id, _)| id.clone())
            .ok_or_else(|| OsError::NotFound(format!("volume mounted at {}", target_path)))
    }
}

/// A simulated host service
#[derive(Debug, Clone)]
pub struct MemoryService {
    pub display_name: String,
    pub start_type: StartType,
    pub status: ServiceStatus,
    pub dependencies: Vec<String>,
}

impl MemoryService {
    /// A stopped service
    pub fn new(display_name: impl Into<String>, start_type: StartType) -> Self {
        Self {
            display_name: display_name.into(),
            start_type,
            status: ServiceStatus::Stopped,
            dependencies: Vec::new(),
        }
    }

    pub fn depends_on(mut self, name: &str) -> Self {
        self.dependencies.push(service_key(name));
        self
    }
}

/// Service names are case-insensitive
fn service_key(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// Simulated service control manager
#[derive(Debug)]
pub struct MemorySystem {
    services: Mutex<BTreeMap<String, MemoryService>>,
}

impl Default for MemorySystem {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySystem {
    /// A host with a stopped iSCSI initiator service
    pub fn new() -> Self {
        let system = Self {
            services: Mutex::new(BTreeMap::new()),
        };
        system.install(
            ISCSI_INITIATOR_SERVICE,
            MemoryService::new("Microsoft iSCSI Initiator Service", StartType::Manual),
        );
        system
    }

    pub fn with_service(self, name: &str, service: MemoryService) -> Self {
        self.install(name, service);
        self
    }

    pub fn install(&self, name: &str, service: MemoryService) {
        lock(&self.services).insert(service_key(name), service);
    }

    pub fn status(&self, name: &str) -> Option<ServiceStatus> {
        lock(&self.services)
            .get(&service_key(name))
            .map(|s| s.status)
    }
}

fn start_locked(
    services: &mut BTreeMap<String, MemoryService>,
    key: &str,
    visiting: &mut Vec<String>,
) -> OsResult<()> {
    if visiting.iter().any(|k| k == key) {
        return Err(OsError::Command(format!(
            "circular dependency on service {}",
            key
        )));
    }
    let service = services
        .get(key)
        .ok_or_else(|| OsError::NotFound(format!("service {}", key)))?;
    if service.status == ServiceStatus::Running {
        return Ok(());
    }
    if service.start_type == StartType::Disabled {
        return Err(OsError::Command(format!("service {} is disabled", key)));
    }

    visiting.push(key.to_string());
    for dependency in service.dependencies.clone() {
        start_locked(services, &dependency, visiting)?;
    }
    visiting.pop();

    if let Some(service) = services.get_mut(key) {
        service.status = ServiceStatus::Running;
    }
    Ok(())
}

fn stop_locked(services: &mut BTreeMap<String, MemoryService>, key: &str, force: bool) -> OsResult<()> {
    let dependents: Vec<String> = services
        .iter()
        .filter(|(_, s)| {
            s.status == ServiceStatus::Running && s.dependencies.iter().any(|d| d == key)
        })
        .map(|(name, _)| name.clone())
        .collect();
    if !dependents.is_empty() {
        if !force {
            return Err(OsError::Busy(format!(
                "service {} has running dependents: {}",
                key,
                dependents.join(", ")
            )));
        }
        for dependent in dependents {
            stop_locked(services, &dependent, true)?;
        }
    }

    let service = services
        .get_mut(key)
        .ok_or_else(|| OsError::NotFound(format!("service {}", key)))?;
    service.status = ServiceStatus::Stopped;
    Ok(())
}

impl SystemOsApi for MemorySystem {
    fn get_service(&self, name: &str) -> OsResult<ServiceInfo> {
        lock(&self.services)
            .get(&service_key(name))
            .map(|s| ServiceInfo {
                display_name: s.display_name.clone(),
                start_type: s.start_type,
                status: s.status,
            })
            .ok_or_else(|| OsError::NotFound(format!("service {}", name)))
    }

    fn start_service(&self, name: &str) -> OsResult<()> {
        start_locked(&mut lock(&self.services), &service_key(name), &mut Vec::new())
    }

    fn stop_service(&self, name: &str, force: bool) -> OsResult<()> {
        stop_locked(&mut lock(&self.services), &service_key(name), force)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IQN: &str = "iqn.2020-01.world.srv:disk1";

    fn portal() -> TargetPortal {
        TargetPortal::new("10.0.0.5", 3260)
    }

    fn creds(auth_type: AuthType, username: &str, secret: &str, mutual: Option<&str>) -> ConnectCredentials {
        ConnectCredentials {
            auth_type,
            username: username.to_string(),
            secret: secret.to_string(),
            mutual_secret: mutual.map(str::to_string),
        }
    }

    #[test]
    fn test_remove_portal_with_session_is_busy() {
        let iscsi = MemoryIscsi::new().with_target(MemoryTarget::new(portal(), IQN));
        iscsi.add_target_portal(&portal()).unwrap();
        iscsi
            .connect_target(&portal(), IQN, &ConnectCredentials::default())
            .unwrap();

        let err = iscsi.remove_target_portal(&portal()).unwrap_err();
        assert!(matches!(err, OsError::Busy(_)));

        iscsi.disconnect_target(&portal(), IQN).unwrap();
        iscsi.remove_target_portal(&portal()).unwrap();
        assert!(iscsi.list_target_portals().unwrap().is_empty());
    }

    #[test]
    fn test_mutual_target_checks_both_directions() {
        let target = MemoryTarget::new(portal(), IQN)
            .with_chap("anotheruser", "averylongsecret")
            .with_mutual_secret("reversssssssse");
        let iscsi = MemoryIscsi::new().with_target(target);
        iscsi.add_target_portal(&portal()).unwrap();

        let one_way = creds(AuthType::OneWayChap, "anotheruser", "averylongsecret", None);
        assert!(matches!(
            iscsi.connect_target(&portal(), IQN, &one_way),
            Err(OsError::Authentication(_))
        ));

        let wrong = creds(AuthType::MutualChap, "anotheruser", "averylongsecret", Some("made-up-pass"));
        assert!(matches!(
            iscsi.connect_target(&portal(), IQN, &wrong),
            Err(OsError::Authentication(_))
        ));

        let right = creds(AuthType::MutualChap, "anotheruser", "averylongsecret", Some("reversssssssse"));
        iscsi.connect_target(&portal(), IQN, &right).unwrap();
        assert_eq!(iscsi.session_count(), 1);
    }

    #[test]
    fn test_injected_failure_fires_once() {
        let iscsi = MemoryIscsi::new();
        iscsi.fail_next("list_target_portals", "initiator service stopped");
        assert!(matches!(iscsi.list_target_portals(), Err(OsError::Command(_))));
        assert!(iscsi.list_target_portals().unwrap().is_empty());
    }

    #[test]
    fn test_partition_creates_volume() {
        let storage = MemoryStorage::new().with_disk(3, &[]);
        storage.partition_disk(3).unwrap();
        let disk = storage.disk(3).unwrap();
        assert!(disk.partitioned);
        assert_eq!(disk.volumes, vec!["disk3-vol1"]);
        assert_eq!(storage.list_volumes_on_disk(3).unwrap(), vec!["disk3-vol1"]);
    }

    #[test]
    fn test_mount_path_cannot_be_reused() {
        let storage = MemoryStorage::new().with_disk(1, &["a", "b"]);
        storage.mount_volume("a", "C:\\mnt\\x").unwrap();
        assert!(matches!(
            storage.mount_volume("b", "C:\\mnt\\x"),
            Err(OsError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_resize_beyond_maximum_fails() {
        let storage = MemoryStorage::new().with_disk(1, &["a"]);
        assert!(storage.resize_volume("a", DEFAULT_VOLUME_MAX_SIZE + 1).is_err());
        storage.resize_volume("a", 2 << 30).unwrap();
        assert_eq!(storage.get_volume_stats("a").unwrap().total_bytes, 2 << 30);
    }

    #[test]
    fn test_start_service_starts_dependencies() {
        let system = MemorySystem::new().with_service(
            "Dependent",
            MemoryService::new("Dependent", StartType::Automatic).depends_on("MSiSCSI"),
        );
        system.start_service("dependent").unwrap();
        assert_eq!(system.status("MSiSCSI"), Some(ServiceStatus::Running));
        assert!(matches!(
            system.stop_service("msiscsi", false),
            Err(OsError::Busy(_))
        ));
        assert!(matches!(
            system.stop_service("NoSuchService", true),
            Err(OsError::NotFound(_))
        ));
    }
}
