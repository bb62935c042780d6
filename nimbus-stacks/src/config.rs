//! Topology configuration
//!
//! Fixed naming and sizing shared by every stack. Defaults describe the
//! production `superman` deployment.

use crate::error::{Result, TopologyError};

const FARGATE_CPU_UNITS: [u32; 5] = [256, 512, 1024, 2048, 4096];

#[derive(Debug, Clone)]
pub struct TopologyConfig {
    /// Prefix of shared infrastructure names (`nf-vpc`, `nf-cluster`, ...)
    pub prefix: String,

    /// Name of the deployed service (`superman`)
    pub service: String,

    pub vpc_cidr: String,
    pub max_azs: usize,

    pub listener_port: u16,
    pub container_port: u16,
    pub health_check_path: String,
    pub api_path_pattern: String,

    /// Object key of the pipeline source bundle in the source bucket
    pub source_key: String,
    pub build_spec: String,
    pub build_image: String,

    pub task_cpu: u32,
    pub task_memory_mib: u32,
    pub desired_count: u32,
    pub image_tag: String,

    pub untagged_image_max_age_days: u32,
    pub log_retention_days: u32,

    /// Roll the listener back when a deployment fails
    pub auto_rollback: bool,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        Self {
            prefix: "nf".to_string(),
            service: "superman".to_string(),
            vpc_cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            listener_port: 80,
            container_port: 8080,
            health_check_path: "/api/v1/health-check".to_string(),
            api_path_pattern: "/api/*".to_string(),
            source_key: "cicd.zip".to_string(),
            build_spec: "cicd/buildspec.yml".to_string(),
            build_image: "aws/codebuild/amazonlinux2-x86_64-standard:5.0".to_string(),
            task_cpu: 512,
            task_memory_mib: 1024,
            desired_count: 1,
            image_tag: "latest".to_string(),
            untagged_image_max_age_days: 10,
            log_retention_days: 7,
            auto_rollback: true,
        }
    }
}

impl TopologyConfig {
    /// `<prefix>-<suffix>`
    pub fn prefixed(&self, suffix: &str) -> String {
        format!("{}-{}", self.prefix, suffix)
    }

    /// `<service>-<suffix>`
    pub fn service_scoped(&self, suffix: &str) -> String {
        format!("{}-{}", self.service, suffix)
    }

    /// ECR repository the build pushes to and the service pulls from
    pub fn repository_name(&self) -> String {
        format!("prod/{}", self.service)
    }

    pub fn validate(&self) -> Result<()> {
        if self.prefix.is_empty() || self.service.is_empty() {
            return Err(TopologyError::InvalidConfig(
                "prefix and service name cannot be empty".to_string(),
            ));
        }

        if !(1..=6).contains(&self.max_azs) {
            return Err(TopologyError::InvalidConfig(format!(
                "max_azs must be between 1 and 6, got {}",
                self.max_azs
            )));
        }

        if self.listener_port == 0 || self.container_port == 0 {
            return Err(TopologyError::InvalidConfig(
                "ports must be greater than 0".to_string(),
            ));
        }

        if !self.health_check_path.starts_with('/') {
            return Err(TopologyError::InvalidConfig(
                "health_check_path must start with '/'".to_string(),
            ));
        }

        if !FARGATE_CPU_UNITS.contains(&self.task_cpu) {
            return Err(TopologyError::InvalidConfig(format!(
                "task_cpu {} is not a Fargate CPU size",
                self.task_cpu
            )));
        }

        if self.task_memory_mib < self.task_cpu * 2 {
            return Err(TopologyError::InvalidConfig(format!(
                "task_memory_mib {} is too small for {} CPU units",
                self.task_memory_mib, self.task_cpu
            )));
        }

        if self.desired_count == 0 {
            return Err(TopologyError::InvalidConfig(
                "desired_count must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}
