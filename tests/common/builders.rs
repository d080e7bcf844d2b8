//! Test data builders for creating test objects

use superads_rs::types::{DeviceProfile, DeviceVariant};

/// Builder for creating test DeviceProfiles
pub struct ProfileBuilder {
    name: String,
    address: String,
    variant: DeviceVariant,
}

impl ProfileBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            address: "5.2.1.1.1.1".to_string(),
            variant: DeviceVariant::V3,
        }
    }

    pub fn address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    pub fn variant(mut self, variant: DeviceVariant) -> Self {
        self.variant = variant;
        self
    }

    pub fn build(self) -> DeviceProfile {
        DeviceProfile::new(self.name, self.address, self.variant)
    }
}

/// The vehicle used throughout the scenario tests
pub fn lgv01() -> DeviceProfile {
    ProfileBuilder::new("LGV01").build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_builder() {
        let profile = ProfileBuilder::new("LGV07")
            .address("192.168.0.7.1.1")
            .variant(DeviceVariant::V2)
            .build();

        assert_eq!(profile.name, "LGV07");
        assert_eq!(profile.address, "192.168.0.7.1.1");
        assert_eq!(profile.variant, DeviceVariant::V2);
    }
}
