//! 实例标识

use uuid::Uuid;

/// 生成 8 位十六进制实例 ID
///
/// 用于在日志和 `/v1/health` 中区分同一服务的不同实例
pub fn generate_instance_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instance_id_shape() {
        let id = generate_instance_id();
        assert_eq!(id.len(), 8);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(id, generate_instance_id());
    }
}
