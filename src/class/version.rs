use std::cmp::Ordering;
use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt};

use crate::error::{Error, Result};
use crate::rw::{Readable, Writeable};

pub fn check_magic_number<T: Read>(buffer: &mut T) -> io::Result<bool> {
    let magic = buffer.read_u32::<BigEndian>()?;
    Ok(magic == 0xCAFE_BABE)
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ClassVersion {
    pub major: u16,
    pub minor: u16,
}

/// Version names accepted by [ClassVersion::from_name]. 1.0 and 1.1 share the
/// same file version.
const VERSION_NAMES: &[(&str, ClassVersion)] = &[
    ("1.0", ClassVersion::new(45, 3)),
    ("1.1", ClassVersion::new(45, 3)),
    ("1.2", ClassVersion::new(46, 0)),
    ("1.3", ClassVersion::new(47, 0)),
    ("1.4", ClassVersion::new(48, 0)),
    ("1.5", ClassVersion::new(49, 0)),
    ("1.6", ClassVersion::new(50, 0)),
];

impl ClassVersion {
    pub const fn new(major: u16, minor: u16) -> Self {
        ClassVersion { major, minor }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        for (candidate, version) in VERSION_NAMES {
            if *candidate == name {
                return Ok(*version);
            }
        }

        Err(Error::Illegal(format!(
            "unsupported class file version {:?}",
            name
        )))
    }

    /// Stack map tables are required from 50.0 ("1.6") on.
    pub fn requires_stack_maps(&self) -> bool {
        *self >= ClassVersion::new(50, 0)
    }

    /// jsr/ret subroutines are only legal below the stack map threshold.
    pub fn allows_subroutines(&self) -> bool {
        !self.requires_stack_maps()
    }

    /// ldc of a CONSTANT_Class entry became legal with 49.0 ("1.5").
    pub fn allows_class_constants(&self) -> bool {
        *self >= ClassVersion::new(49, 0)
    }
}

impl Default for ClassVersion {
    fn default() -> Self {
        ClassVersion::new(50, 0)
    }
}

impl Readable for ClassVersion {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self> {
        // The file stores minor before major.
        let minor = u16::read(buffer)?;
        let major = u16::read(buffer)?;
        Ok(ClassVersion { major, minor })
    }
}

impl Writeable for ClassVersion {
    fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()> {
        self.minor.write(buffer)?;
        self.major.write(buffer)
    }
}

impl PartialOrd for ClassVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClassVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.major.cmp(&other.major) {
            Ordering::Equal => self.minor.cmp(&other.minor),
            x => x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_names() {
        assert_eq!(
            ClassVersion::from_name("1.0").unwrap(),
            ClassVersion::new(45, 3)
        );
        assert_eq!(
            ClassVersion::from_name("1.6").unwrap(),
            ClassVersion::new(50, 0)
        );
        assert!(ClassVersion::from_name("11").is_err());
    }

    #[test]
    fn stack_map_threshold() {
        assert!(!ClassVersion::new(49, 0).requires_stack_maps());
        assert!(ClassVersion::new(50, 0).requires_stack_maps());
        assert!(ClassVersion::new(49, 0).allows_subroutines());
    }

    #[test]
    fn minor_first_on_disk() {
        let bytes = ClassVersion::new(50, 0).to_vec().unwrap();
        assert_eq!(bytes, [0x00, 0x00, 0x00, 0x32]);
    }

    #[test]
    fn ordering() {
        assert!(ClassVersion::new(45, 3) < ClassVersion::new(46, 0));
        assert!(ClassVersion::new(46, 0) < ClassVersion::new(46, 1));
    }
}
