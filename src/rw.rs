//! Reading and writing primitives for the class file format. Since these
//! traits are aimed solely at the Java class file format they disregard other
//! forms of encoding in favor of a simplified interface; all primitives are
//! handled in big endian unless explicitly implemented otherwise for a given
//! type.

use std::io::{self, Cursor, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

pub trait Readable: Sized {
    fn read<T: Read>(buffer: &mut T) -> io::Result<Self>;

    fn from_slice<S: AsRef<[u8]>>(slice: S) -> io::Result<Self> {
        let mut buffer = Cursor::new(slice.as_ref());
        Self::read(&mut buffer)
    }
}

pub trait Writeable {
    fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()>;

    fn to_vec(&self) -> io::Result<Vec<u8>> {
        let mut vec = Vec::new();
        self.write(&mut vec)?;
        Ok(vec)
    }
}

/// Most (with some notable exceptions) repetitions of structures in the class
/// file follow the format of a u16 count followed by the entries. This handles
/// the general case; the constant pool has its own rules due to legacy
/// double-slot entries and is handled separately.
impl<T: Readable> Readable for Vec<T> {
    fn read<B: Read>(buffer: &mut B) -> io::Result<Self> {
        let count = buffer.read_u16::<BigEndian>()?;
        let mut vec = Vec::with_capacity(count as usize);

        for _ in 0..count {
            vec.push(T::read(buffer)?);
        }

        Ok(vec)
    }
}

impl<T: Writeable> Writeable for Vec<T> {
    fn write<B: Write>(&self, buffer: &mut B) -> io::Result<()> {
        buffer.write_u16::<BigEndian>(self.len() as u16)?;

        for entry in self {
            entry.write(buffer)?;
        }

        Ok(())
    }
}

macro_rules! impl_primitive {
    ($type:ty: $($read:tt)+) => {
        impl Readable for $type {
            fn read<T: Read>(buffer: &mut T) -> io::Result<Self> { $($read)+(buffer) }
        }
    };
}

macro_rules! impl_primitive_write {
    ($type:ty: $($write:tt)+) => {
        impl Writeable for $type {
            fn write<T: Write>(&self, buffer: &mut T) -> io::Result<()> { $($write)+(buffer, *self) }
        }
    };
}

// Wrap primitives with byteorder read/write methods for big endian encoding.
impl_primitive!(u8: ReadBytesExt::read_u8);
impl_primitive!(u16: ReadBytesExt::read_u16::<BigEndian>);
impl_primitive!(u32: ReadBytesExt::read_u32::<BigEndian>);
impl_primitive!(u64: ReadBytesExt::read_u64::<BigEndian>);
impl_primitive!(i8: ReadBytesExt::read_i8);
impl_primitive!(i16: ReadBytesExt::read_i16::<BigEndian>);
impl_primitive!(i32: ReadBytesExt::read_i32::<BigEndian>);
impl_primitive!(i64: ReadBytesExt::read_i64::<BigEndian>);
impl_primitive!(f32: ReadBytesExt::read_f32::<BigEndian>);
impl_primitive!(f64: ReadBytesExt::read_f64::<BigEndian>);

impl_primitive_write!(u8: WriteBytesExt::write_u8);
impl_primitive_write!(u16: WriteBytesExt::write_u16::<BigEndian>);
impl_primitive_write!(u32: WriteBytesExt::write_u32::<BigEndian>);
impl_primitive_write!(u64: WriteBytesExt::write_u64::<BigEndian>);
impl_primitive_write!(i8: WriteBytesExt::write_i8);
impl_primitive_write!(i16: WriteBytesExt::write_i16::<BigEndian>);
impl_primitive_write!(i32: WriteBytesExt::write_i32::<BigEndian>);
impl_primitive_write!(i64: WriteBytesExt::write_i64::<BigEndian>);
impl_primitive_write!(f32: WriteBytesExt::write_f32::<BigEndian>);
impl_primitive_write!(f64: WriteBytesExt::write_f64::<BigEndian>);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_round_trip() {
        let values: Vec<u16> = vec![1, 2, 0xCAFE];
        let bytes = values.to_vec().unwrap();
        assert_eq!(bytes, [0, 3, 0, 1, 0, 2, 0xCA, 0xFE]);
        assert_eq!(<Vec<u16>>::from_slice(&bytes).unwrap(), values);
    }
}
