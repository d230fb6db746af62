//! PowerShell backend
//!
//! Drives the Windows iSCSI initiator, storage and service cmdlets. Each operation is a
//! single script run through `powershell.exe -NoProfile -NonInteractive`.
//! Structured results come back as JSON via `ConvertTo-Json`; failures are
//! classified from the error text PowerShell writes to stderr.

use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::process::Command;

use super::{
    ConnectCredentials, DiskOsApi, IscsiOsApi, OsError, OsResult, ServiceInfo, SystemOsApi,
    VolumeOsApi, VolumeStats,
};
use crate::iscsi::{AuthType, TargetPortal};
use crate::system::{ServiceStatus, StartType};

/// Runs cmdlets through a PowerShell executable
#[derive(Debug, Clone)]
pub struct PowerShell {
    program: String,
}

impl PowerShell {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Run a script and return its trimmed stdout
    fn run(&self, script: &str) -> OsResult<String> {
        log::debug!("powershell: {}", redact(script));
        let output = Command::new(&self.program)
            .args(["-NoProfile", "-NonInteractive", "-Command"])
            .arg(format!("$ErrorActionPreference = 'Stop'; {}", script))
            .output()?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_failure(stderr.trim()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn run_json<T: DeserializeOwned>(&self, script: &str) -> OsResult<T> {
        let stdout = self.run(script)?;
        parse_json(&stdout)
    }
}

/// Quote a value as a PowerShell single-quoted literal
pub fn quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

fn redact(script: &str) -> String {
    if script.contains("-ChapSecret") {
        "<script with CHAP secret>".to_string()
    } else {
        script.to_string()
    }
}

/// Map PowerShell error text to an [`OsError`]
pub fn classify_failure(stderr: &str) -> OsError {
    let message = stderr.lines().next().unwrap_or("powershell failed").to_string();
    let lower = stderr.to_lowercase();

    if lower.contains("authentication failure") || (lower.contains("chap") && lower.contains("fail")) {
        OsError::Authentication(message)
    } else if lower.contains("no matching")
        || lower.contains("objectnotfound")
        || lower.contains("not found")
        || lower.contains("cannot find any service")
    {
        OsError::NotFound(message)
    } else if lower.contains("already") {
        OsError::AlreadyExists(message)
    } else if lower.contains("in use")
        || lower.contains("active session")
        || lower.contains("dependent services")
    {
        OsError::Busy(message)
    } else {
        OsError::Command(message)
    }
}

/// Parse `ConvertTo-Json` output. Empty output decodes as JSON `null`.
pub fn parse_json<T: DeserializeOwned>(stdout: &str) -> OsResult<T> {
    let text = if stdout.is_empty() { "null" } else { stdout };
    serde_json::from_str(text)
        .map_err(|e| OsError::Output(format!("{} in {:?}", e, truncate(text, 200))))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((index, _)) => &s[..index],
        None => s,
    }
}

#[derive(Debug, Deserialize)]
struct PortalRecord {
    #[serde(rename = "TargetPortalAddress")]
    address: String,
    #[serde(rename = "TargetPortalPortNumber")]
    port: u16,
}

#[derive(Debug, Deserialize)]
struct ServiceRecord {
    #[serde(rename = "DisplayName")]
    display_name: String,
    #[serde(rename = "StartType")]
    start_type: String,
    #[serde(rename = "Status")]
    status: String,
}

#[derive(Debug, Deserialize)]
struct VolumeSizeRecord {
    #[serde(rename = "Size")]
    size: u64,
    #[serde(rename = "SizeRemaining")]
    size_remaining: u64,
}

fn portal_args(portal: &TargetPortal) -> String {
    format!(
        "-TargetPortalAddress {} -TargetPortalPortNumber {}",
        quote(&portal.address),
        portal.effective_port()
    )
}

/// Connections for (portal, iqn), as a pipeline prefix
fn connection_filter(portal: &TargetPortal, iqn: &str) -> String {
    format!(
        "Get-IscsiTarget -NodeAddress {} | Get-IscsiConnection | Where-Object {{ $_.TargetAddress -eq {} -and $_.TargetPortNumber -eq {} }}",
        quote(iqn),
        quote(&portal.address),
        portal.effective_port()
    )
}

pub fn add_target_portal_script(portal: &TargetPortal) -> String {
    format!("New-IscsiTargetPortal {} | Out-Null", portal_args(portal))
}

pub fn list_target_portals_script() -> String {
    "ConvertTo-Json -InputObject @(Get-IscsiTargetPortal | Select-Object TargetPortalAddress, TargetPortalPortNumber)".to_string()
}

pub fn remove_target_portal_script(portal: &TargetPortal) -> String {
    format!(
        "Get-IscsiTargetPortal {} | Remove-IscsiTargetPortal -Confirm:$false",
        portal_args(portal)
    )
}

pub fn discover_target_portal_script(portal: &TargetPortal) -> String {
    format!(
        "ConvertTo-Json -InputObject @(Get-IscsiTargetPortal {} | Get-IscsiTarget | ForEach-Object {{ $_.NodeAddress }})",
        portal_args(portal)
    )
}

pub fn connect_target_script(
    portal: &TargetPortal,
    iqn: &str,
    credentials: &ConnectCredentials,
) -> String {
    let mut script = String::new();

    // The initiator keeps one mutual secret; re-apply the current one so the
    // login uses the value in force at call time.
    if let Some(mutual) = &credentials.mutual_secret {
        script.push_str(&format!("Set-IscsiChapSecret -ChapSecret {}; ", quote(mutual)));
    }

    let auth = match credentials.auth_type {
        AuthType::None => "NONE",
        AuthType::OneWayChap => "ONEWAYCHAP",
        AuthType::MutualChap => "MUTUALCHAP",
    };
    script.push_str(&format!(
        "Connect-IscsiTarget -NodeAddress {} {} -IsPersistent $true -AuthenticationType {}",
        quote(iqn),
        portal_args(portal),
        auth
    ));
    if credentials.auth_type != AuthType::None {
        script.push_str(&format!(
            " -ChapUsername {} -ChapSecret {}",
            quote(&credentials.username),
            quote(&credentials.secret)
        ));
    }
    script.push_str(" | Out-Null");
    script
}

/// Fail with a NotFound-classified error when `$connections` is empty.
/// Both names reach the script only as quoted literals.
fn no_session_guard(portal: &TargetPortal, iqn: &str) -> String {
    format!(
        "if ($connections.Count -eq 0) {{ throw ('No matching session for ' + {} + ' via ' + {}) }}",
        quote(iqn),
        quote(&portal.to_string())
    )
}

pub fn disconnect_target_script(portal: &TargetPortal, iqn: &str) -> String {
    format!(
        "$connections = @({filter}); {guard}; \
         foreach ($session in @($connections | Get-IscsiSession)) {{ \
         if ($session.IsPersistent) {{ Unregister-IscsiSession -SessionIdentifier $session.SessionIdentifier }}; \
         Disconnect-IscsiTarget -SessionIdentifier $session.SessionIdentifier -Confirm:$false }}",
        filter = connection_filter(portal, iqn),
        guard = no_session_guard(portal, iqn),
    )
}

pub fn get_target_disks_script(portal: &TargetPortal, iqn: &str) -> String {
    format!(
        "$connections = @({filter}); {guard}; \
         ConvertTo-Json -InputObject @($connections | Get-Disk | ForEach-Object {{ $_.Number }})",
        filter = connection_filter(portal, iqn),
        guard = no_session_guard(portal, iqn),
    )
}

pub fn set_mutual_chap_secret_script(secret: &str) -> String {
    format!("Set-IscsiChapSecret -ChapSecret {}", quote(secret))
}

/// Volume ids on a disk. Only a missing disk is an error: partitions without
/// a volume (the GPT reserved partition) are skipped.
pub fn list_volumes_on_disk_script(disk_number: u32) -> String {
    format!(
        "$disk = Get-Disk -Number {}; \
         ConvertTo-Json -InputObject @($disk | Get-Partition -ErrorAction SilentlyContinue | \
         Get-Volume -ErrorAction SilentlyContinue | Where-Object {{ $_.UniqueId }} | \
         ForEach-Object {{ $_.UniqueId }})",
        disk_number
    )
}

pub fn get_service_script(name: &str) -> String {
    format!(
        "Get-Service -Name {} | Select-Object DisplayName, \
         @{{ Name = 'StartType'; Expression = {{ $_.StartType.ToString() }} }}, \
         @{{ Name = 'Status'; Expression = {{ $_.Status.ToString() }} }} | ConvertTo-Json",
        quote(name)
    )
}

pub fn start_service_script(name: &str) -> String {
    format!("Start-Service -Name {}", quote(name))
}

pub fn stop_service_script(name: &str, force: bool) -> String {
    let mut script = format!("Stop-Service -Name {}", quote(name));
    if force {
        script.push_str(" -Force");
    }
    script
}

fn parse_status(status: &str) -> ServiceStatus {
    match status {
        "Stopped" => ServiceStatus::Stopped,
        "StartPending" => ServiceStatus::StartPending,
        "StopPending" => ServiceStatus::StopPending,
        "Running" => ServiceStatus::Running,
        "ContinuePending" => ServiceStatus::ContinuePending,
        "PausePending" => ServiceStatus::PausePending,
        "Paused" => ServiceStatus::Paused,
        _ => ServiceStatus::Unknown,
    }
}

fn parse_start_type(start_type: &str) -> StartType {
    match start_type {
        "Boot" => StartType::Boot,
        "System" => StartType::System,
        "Automatic" => StartType::Automatic,
        "Manual" => StartType::Manual,
        "Disabled" => StartType::Disabled,
        _ => StartType::Unknown,
    }
}

fn volume(volume_id: &str) -> String {
    format!("Get-Volume -UniqueId {}", quote(volume_id))
}

impl IscsiOsApi for PowerShell {
    fn add_target_portal(&self, portal: &TargetPortal) -> OsResult<()> {
        self.run(&add_target_portal_script(portal)).map(drop)
    }

    fn list_target_portals(&self) -> OsResult<Vec<TargetPortal>> {
        let records: Vec<PortalRecord> = self.run_json(&list_target_portals_script())?;
        Ok(records
            .into_iter()
            .map(|r| TargetPortal::new(r.address, r.port))
            .collect())
    }

    fn remove_target_portal(&self, portal: &TargetPortal) -> OsResult<()> {
        self.run(&remove_target_portal_script(portal)).map(drop)
    }

    fn discover_target_portal(&self, portal: &TargetPortal) -> OsResult<Vec<String>> {
        self.run_json(&discover_target_portal_script(portal))
    }

    fn connect_target(
        &self,
        portal: &TargetPortal,
        iqn: &str,
        credentials: &ConnectCredentials,
    ) -> OsResult<()> {
        self.run(&connect_target_script(portal, iqn, credentials))
            .map(drop)
    }

    fn disconnect_target(&self, portal: &TargetPortal, iqn: &str) -> OsResult<()> {
        self.run(&disconnect_target_script(portal, iqn)).map(drop)
    }

    fn get_target_disks(&self, portal: &TargetPortal, iqn: &str) -> OsResult<Vec<String>> {
        let numbers: Vec<u32> = self.run_json(&get_target_disks_script(portal, iqn))?;
        Ok(numbers.iter().map(u32::to_string).collect())
    }

    fn set_mutual_chap_secret(&self, secret: &str) -> OsResult<()> {
        self.run(&set_mutual_chap_secret_script(secret)).map(drop)
    }
}

impl DiskOsApi for PowerShell {
    fn get_disk_state(&self, disk_number: u32) -> OsResult<bool> {
        let offline: bool = self.run_json(&format!(
            "ConvertTo-Json -InputObject (Get-Disk -Number {}).IsOffline",
            disk_number
        ))?;
        Ok(!offline)
    }

    fn set_disk_state(&self, disk_number: u32, is_online: bool) -> OsResult<()> {
        let offline = if is_online { "$false" } else { "$true" };
        self.run(&format!(
            "Set-Disk -Number {} -IsOffline {}",
            disk_number, offline
        ))
        .map(drop)
    }

    fn partition_disk(&self, disk_number: u32) -> OsResult<()> {
        self.run(&format!(
            "Initialize-Disk -Number {n} -PartitionStyle GPT; \
             New-Partition -DiskNumber {n} -UseMaximumSize | Out-Null",
            n = disk_number
        ))
        .map(drop)
    }
}

impl VolumeOsApi for PowerShell {
    fn list_volumes_on_disk(&self, disk_number: u32) -> OsResult<Vec<String>> {
        self.run_json(&list_volumes_on_disk_script(disk_number))
    }

    fn is_volume_formatted(&self, volume_id: &str) -> OsResult<bool> {
        self.run_json(&format!(
            "ConvertTo-Json -InputObject (({}).FileSystemType -ne 'Unknown')",
            volume(volume_id)
        ))
    }

    fn format_volume(&self, volume_id: &str, filesystem: &str) -> OsResult<()> {
        self.run(&format!(
            "{} | Format-Volume -FileSystem {} -Confirm:$false | Out-Null",
            volume(volume_id),
            quote(filesystem)
        ))
        .map(drop)
    }

    fn mount_volume(&self, volume_id: &str, target_path: &str) -> OsResult<()> {
        self.run(&format!(
            "{} | Get-Partition | Add-PartitionAccessPath -AccessPath {}",
            volume(volume_id),
            quote(target_path)
        ))
        .map(drop)
    }

    fn unmount_volume(&self, volume_id: &str, target_path: &str) -> OsResult<()> {
        self.run(&format!(
            "{} | Get-Partition | Remove-PartitionAccessPath -AccessPath {}",
            volume(volume_id),
            quote(target_path)
        ))
        .map(drop)
    }

    fn resize_volume(&self, volume_id: &str, size_bytes: u64) -> OsResult<()> {
        let size = if size_bytes == 0 {
            format!("({} | Get-Partition | Get-PartitionSupportedSize).SizeMax", volume(volume_id))
        } else {
            size_bytes.to_string()
        };
        self.run(&format!(
            "{} | Get-Partition | Resize-Partition -Size {}",
            volume(volume_id),
            size
        ))
        .map(drop)
    }

    fn get_volume_stats(&self, volume_id: &str) -> OsResult<VolumeStats> {
        let record: VolumeSizeRecord = self.run_json(&format!(
            "{} | Select-Object Size, SizeRemaining | ConvertTo-Json",
            volume(volume_id)
        ))?;
        Ok(VolumeStats {
            total_bytes: record.size,
            used_bytes: record.size.saturating_sub(record.size_remaining),
        })
    }

    fn write_volume_cache(&self, volume_id: &str) -> OsResult<()> {
        self.run(&format!("{} | Write-VolumeCache", volume(volume_id)))
            .map(drop)
    }

    fn get_disk_number_from_volume_id(&self, volume_id: &str) -> OsResult<u32> {
        self.run_json(&format!(
            "ConvertTo-Json -InputObject ({} | Get-Partition).DiskNumber",
            volume(volume_id)
        ))
    }

    fn get_volume_id_from_target_path(&self, target_path: &str) -> OsResult<String> {
        let path = target_path.trim_end_matches('\\');
        let id: Option<String> = self.run_json(&format!(
            "ConvertTo-Json -InputObject (Get-Partition | Where-Object {{ $_.AccessPaths -contains {} }} | Get-Volume | Select-Object -First 1 -ExpandProperty UniqueId)",
            quote(&format!("{}\\", path))
        ))?;
        id.ok_or_else(|| OsError::NotFound(format!("volume mounted at {}", target_path)))
    }
}

impl SystemOsApi for PowerShell {
    fn get_service(&self, name: &str) -> OsResult<ServiceInfo> {
        let record: ServiceRecord = self.run_json(&get_service_script(name))?;
        Ok(ServiceInfo {
            display_name: record.display_name,
            start_type: parse_start_type(&record.start_type),
            status: parse_status(&record.status),
        })
    }

    fn start_service(&self, name: &str) -> OsResult<()> {
        self.run(&start_service_script(name)).map(drop)
    }

    fn stop_service(&self, name: &str, force: bool) -> OsResult<()> {
        self.run(&stop_service_script(name, force)).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_escapes_single_quotes() {
        assert_eq!(quote("plain"), "'plain'");
        assert_eq!(quote("it's"), "'it''s'");
        assert_eq!(quote("'; Remove-Item C:\\ -Recurse; '"), "'''; Remove-Item C:\\ -Recurse; '''");
    }

    #[test]
    fn test_portal_args_use_default_port() {
        let script = add_target_portal_script(&TargetPortal::new("10.0.0.5", 0));
        assert_eq!(
            script,
            "New-IscsiTargetPortal -TargetPortalAddress '10.0.0.5' -TargetPortalPortNumber 3260 | Out-Null"
        );
    }

    #[test]
    fn test_connect_script_auth_modes() {
        let portal = TargetPortal::new("srv", 3260);
        let none = connect_target_script(&portal, "iqn.x", &ConnectCredentials::default());
        assert!(none.contains("-AuthenticationType NONE"));
        assert!(!none.contains("-ChapSecret"));

        let mutual = ConnectCredentials {
            auth_type: AuthType::MutualChap,
            username: "user".to_string(),
            secret: "secret".to_string(),
            mutual_secret: Some("reverse".to_string()),
        };
        let script = connect_target_script(&portal, "iqn.x", &mutual);
        assert!(script.starts_with("Set-IscsiChapSecret -ChapSecret 'reverse'; "));
        assert!(script.contains("-AuthenticationType MUTUALCHAP"));
        assert!(script.contains("-ChapUsername 'user' -ChapSecret 'secret'"));
        assert_eq!(redact(&script), "<script with CHAP secret>");
    }

    #[test]
    fn test_session_scripts_fail_without_connection() {
        let portal = TargetPortal::new("srv", 0);
        let script = disconnect_target_script(&portal, "iqn.x");
        assert!(script.contains(
            "throw ('No matching session for ' + 'iqn.x' + ' via ' + 'srv:3260')"
        ));
        assert!(get_target_disks_script(&portal, "iqn.x").contains("Get-Disk"));
    }

    #[test]
    fn test_session_scripts_quote_portal_address() {
        let portal = TargetPortal::new("srv'; Remove-Item C:\\data -Recurse; '", 0);
        for script in [
            disconnect_target_script(&portal, "iqn.x"),
            get_target_disks_script(&portal, "iqn.x"),
        ] {
            assert!(!script.contains("via srv'; Remove-Item"));
            assert!(script.contains("' via ' + 'srv''; Remove-Item C:\\data -Recurse; '':3260'"));
            assert!(!script.contains("$_.TargetAddress -eq 'srv'; "));
        }

        let script = disconnect_target_script(&TargetPortal::new("srv", 0), "iqn.x' + (Stop-Computer) + '");
        assert!(script.contains("'iqn.x'' + (Stop-Computer) + '''"));
    }

    #[test]
    fn test_list_volumes_only_fails_on_missing_disk() {
        let script = list_volumes_on_disk_script(4);
        assert!(script.starts_with("$disk = Get-Disk -Number 4; "));
        assert!(!script.contains("Get-Disk -Number 4 -ErrorAction"));
        assert!(script.contains("Get-Partition -ErrorAction SilentlyContinue"));
        assert!(script.contains("Get-Volume -ErrorAction SilentlyContinue"));
        assert!(script.contains("Where-Object { $_.UniqueId }"));
    }

    #[test]
    fn test_service_scripts() {
        assert_eq!(start_service_script("MSiSCSI"), "Start-Service -Name 'MSiSCSI'");
        assert_eq!(stop_service_script("MSiSCSI", false), "Stop-Service -Name 'MSiSCSI'");
        assert_eq!(
            stop_service_script("MSiSCSI", true),
            "Stop-Service -Name 'MSiSCSI' -Force"
        );
        assert!(get_service_script("it's").starts_with("Get-Service -Name 'it''s' | "));

        let record: ServiceRecord = parse_json(
            r#"{"DisplayName":"Microsoft iSCSI Initiator Service","StartType":"Manual","Status":"Stopped"}"#,
        )
        .unwrap();
        assert_eq!(parse_start_type(&record.start_type), StartType::Manual);
        assert_eq!(parse_status(&record.status), ServiceStatus::Stopped);
        assert_eq!(parse_status("Bogus"), ServiceStatus::Unknown);

        assert!(matches!(
            classify_failure("Get-Service : Cannot find any service with service name 'nope'."),
            OsError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure("Stop-Service : Cannot stop service 'MSiSCSI' because it has dependent services."),
            OsError::Busy(_)
        ));
    }

    #[test]
    fn test_classify_failure() {
        assert!(matches!(
            classify_failure("Connect-IscsiTarget : Authentication Failure."),
            OsError::Authentication(_)
        ));
        assert!(matches!(
            classify_failure("No matching session for iqn.x via srv:3260"),
            OsError::NotFound(_)
        ));
        assert!(matches!(
            classify_failure("The target has already been logged in via an iSCSI session."),
            OsError::AlreadyExists(_)
        ));
        assert!(matches!(
            classify_failure("The session cannot be logged out since a device on that session is currently being used."),
            OsError::Command(_)
        ));
    }

    #[test]
    fn test_parse_json_outputs() {
        let portals: Vec<PortalRecord> = parse_json(
            r#"[{"TargetPortalAddress":"10.0.0.5","TargetPortalPortNumber":3260}]"#,
        )
        .unwrap();
        assert_eq!(portals[0].address, "10.0.0.5");
        assert_eq!(portals[0].port, 3260);

        let iqns: Vec<String> = parse_json("[]").unwrap();
        assert!(iqns.is_empty());

        let missing: Option<String> = parse_json("").unwrap();
        assert!(missing.is_none());

        let err = parse_json::<Vec<u32>>("not json").unwrap_err();
        assert!(matches!(err, OsError::Output(_)));
    }
}
