//! Instance boot scripts.
//!
//! Templates are minijinja with two variables: `cluster_name` (the provider
//! name of the environment's cluster) and `s3_bucket`. The rendered script
//! is handed to the launch configuration base64-encoded.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use minijinja::{Environment, UndefinedBehavior, context};

use strata_core::OperatingSystem;

use crate::error::{OrchestratorError, OrchestratorResult};

pub const DEFAULT_LINUX_TEMPLATE: &str = r#"#!/bin/bash
echo ECS_CLUSTER={{ cluster_name }} >> /etc/ecs/ecs.config
echo ECS_ENGINE_AUTH_TYPE=dockercfg >> /etc/ecs/ecs.config
yum install -y aws-cli awslogs jq
aws s3 cp s3://{{ s3_bucket }}/bootstrap/dockercfg dockercfg
cfg=$(cat dockercfg)
echo ECS_ENGINE_AUTH_DATA=$cfg >> /etc/ecs/ecs.config
docker pull amazon/amazon-ecs-agent:latest
start ecs
"#;

pub const DEFAULT_WINDOWS_TEMPLATE: &str = r#"<powershell>
$clusterName = "{{ cluster_name }}"
Write-Host Cluster name set as: $clusterName -foreground green

[Environment]::SetEnvironmentVariable("ECS_CLUSTER", $clusterName, "Machine")
[Environment]::SetEnvironmentVariable("ECS_ENABLE_TASK_IAM_ROLE", "false", "Machine")
$agentVersion = 'v1.14.0-1.windows.1'
$agentZipUri = "https://s3.amazonaws.com/amazon-ecs-agent/ecs-agent-windows-$agentVersion.zip"
$agentZipMD5Uri = "$agentZipUri.md5"

Read-S3Object -BucketName {{ s3_bucket }} -Key bootstrap/dockercfg -File dockercfg.json
$dockercfgContent = [IO.File]::ReadAllText("dockercfg.json")
[Environment]::SetEnvironmentVariable("ECS_ENGINE_AUTH_DATA", $dockercfgContent, "Machine")
[Environment]::SetEnvironmentVariable("ECS_ENGINE_AUTH_TYPE", "dockercfg", "Machine")

$ecsExeDir = "$env:ProgramFiles\Amazon\ECS"
$zipFile = "$env:TEMP\ecs-agent.zip"
$md5File = "$env:TEMP\ecs-agent.zip.md5"

Invoke-RestMethod -OutFile $zipFile -Uri $agentZipUri
Invoke-RestMethod -OutFile $md5File -Uri $agentZipMD5Uri

$expectedMD5 = (Get-Content $md5File)
$md5 = New-Object -TypeName System.Security.Cryptography.MD5CryptoServiceProvider
$actualMD5 = [System.BitConverter]::ToString($md5.ComputeHash([System.IO.File]::ReadAllBytes($zipFile))).replace('-', '')

if($expectedMD5 -ne $actualMD5) {
    echo "Download doesn't match hash."
    echo "Expected: $expectedMD5 - Got: $actualMD5"
    exit 1
}

Expand-Archive -Path $zipFile -DestinationPath $ecsExeDir -Force

$jobname = "ECS-Agent-Init"
$script =  "cd '$ecsExeDir'; .\amazon-ecs-agent.ps1"
$repeat = (New-TimeSpan -Minutes 1)

$jobpath = $env:LOCALAPPDATA + "\Microsoft\Windows\PowerShell\ScheduledJobs\$jobname\ScheduledJobDefinition.xml"
if($(Test-Path -Path $jobpath)) {
  echo "Job definition already present"
  exit 0
}

$scriptblock = [scriptblock]::Create("$script")
$trigger = New-JobTrigger -At (Get-Date).Date -RepeatIndefinitely -RepetitionInterval $repeat -Once
$options = New-ScheduledJobOption -RunElevated -ContinueIfGoingOnBattery -StartIfOnBattery
Register-ScheduledJob -Name $jobname -ScriptBlock $scriptblock -Trigger $trigger -ScheduledJobOption $options -RunNow
Add-JobTrigger -Name $jobname -Trigger (New-JobTrigger -AtStartup -RandomDelay 00:1:00)
</powershell>
<persist>true</persist>
"#;

pub fn default_template(os: OperatingSystem) -> &'static str {
    match os {
        OperatingSystem::Linux => DEFAULT_LINUX_TEMPLATE,
        OperatingSystem::Windows => DEFAULT_WINDOWS_TEMPLATE,
    }
}

/// Render `template` and base64-encode the result.
///
/// Undefined variables are an error rather than an empty string.
pub fn render(template: &str, cluster_name: &str, s3_bucket: &str) -> OrchestratorResult<String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Strict);
    env.add_template("user_data", template)
        .map_err(|e| OrchestratorError::Template(format!("failed to parse user data: {e}")))?;

    let rendered = env
        .get_template("user_data")
        .and_then(|tmpl| tmpl.render(context! { cluster_name, s3_bucket }))
        .map_err(|e| OrchestratorError::Template(format!("failed to render user data: {e}")))?;

    Ok(STANDARD.encode(rendered))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(encoded: &str) -> String {
        String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn linux_default_names_cluster_and_bucket() {
        let encoded = render(DEFAULT_LINUX_TEMPLATE, "l0-dev-prod1a2b3c4d", "strata-dev").unwrap();
        let script = decode(&encoded);
        assert!(script.starts_with("#!/bin/bash"));
        assert!(script.contains("ECS_CLUSTER=l0-dev-prod1a2b3c4d"));
        assert!(script.contains("s3://strata-dev/bootstrap/dockercfg"));
    }

    #[test]
    fn windows_default_is_powershell() {
        let script = decode(&render(DEFAULT_WINDOWS_TEMPLATE, "l0-dev-win", "bucket").unwrap());
        assert!(script.starts_with("<powershell>"));
        assert!(script.contains(r#"$clusterName = "l0-dev-win""#));
        assert!(script.contains("-BucketName bucket"));
    }

    #[test]
    fn custom_templates_render() {
        let script = decode(&render("cluster={{ cluster_name }}", "c1", "b").unwrap());
        assert_eq!(script, "cluster=c1");
    }

    #[test]
    fn syntax_errors_are_template_errors() {
        let err = render("{{ cluster_name ", "c1", "b").unwrap_err();
        assert!(matches!(err, OrchestratorError::Template(ref msg) if msg.contains("parse")));
    }

    #[test]
    fn unknown_variables_fail_to_render() {
        let err = render("{{ region }}", "c1", "b").unwrap_err();
        assert!(matches!(err, OrchestratorError::Template(ref msg) if msg.contains("render")));
    }
}
