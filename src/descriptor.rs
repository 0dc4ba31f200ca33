//! Type and method descriptors. Descriptors are interned through a
//! process-wide table so equal descriptors share a single allocation and
//! comparisons reduce to pointer equality.

use std::fmt::{self, Debug, Display, Formatter};
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::RwLock;

use crate::error::{Error, Result};

#[derive(Debug, PartialEq, Eq, Hash)]
pub enum TypeKind {
    Boolean,
    Byte,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
    /// Valid only as a method return type.
    Void,
    /// Internal-form class name, e.g. `java/lang/String`.
    Object(String),
    Array(TypeDesc),
}

struct TypeInner {
    kind: TypeKind,
    descriptor: String,
}

/// An interned type descriptor. Cheap to clone and compare; two descriptors
/// spelling the same type are always the same allocation.
#[derive(Clone)]
pub struct TypeDesc {
    inner: Arc<TypeInner>,
}

lazy_static! {
    static ref INTERN_TABLE: RwLock<HashMap<String, TypeDesc>> = RwLock::new(HashMap::new());
}

fn intern(kind: TypeKind) -> TypeDesc {
    let descriptor = render_descriptor(&kind);

    if let Some(existing) = INTERN_TABLE.read().get(&descriptor) {
        return existing.clone();
    }

    let mut table = INTERN_TABLE.write();
    table
        .entry(descriptor.clone())
        .or_insert_with(|| TypeDesc {
            inner: Arc::new(TypeInner { kind, descriptor }),
        })
        .clone()
}

fn render_descriptor(kind: &TypeKind) -> String {
    match kind {
        TypeKind::Boolean => "Z".to_string(),
        TypeKind::Byte => "B".to_string(),
        TypeKind::Char => "C".to_string(),
        TypeKind::Short => "S".to_string(),
        TypeKind::Int => "I".to_string(),
        TypeKind::Long => "J".to_string(),
        TypeKind::Float => "F".to_string(),
        TypeKind::Double => "D".to_string(),
        TypeKind::Void => "V".to_string(),
        TypeKind::Object(name) => format!("L{};", name),
        TypeKind::Array(component) => format!("[{}", component.descriptor()),
    }
}

impl TypeDesc {
    pub fn boolean() -> TypeDesc {
        intern(TypeKind::Boolean)
    }

    pub fn byte() -> TypeDesc {
        intern(TypeKind::Byte)
    }

    pub fn char() -> TypeDesc {
        intern(TypeKind::Char)
    }

    pub fn short() -> TypeDesc {
        intern(TypeKind::Short)
    }

    pub fn int() -> TypeDesc {
        intern(TypeKind::Int)
    }

    pub fn long() -> TypeDesc {
        intern(TypeKind::Long)
    }

    pub fn float() -> TypeDesc {
        intern(TypeKind::Float)
    }

    pub fn double() -> TypeDesc {
        intern(TypeKind::Double)
    }

    pub fn void() -> TypeDesc {
        intern(TypeKind::Void)
    }

    /// Build a primitive descriptor from its one-character code (`b'I'`,
    /// `b'Z'`, ...).
    pub fn primitive(code: u8) -> Result<TypeDesc> {
        Ok(match code {
            b'Z' => Self::boolean(),
            b'B' => Self::byte(),
            b'C' => Self::char(),
            b'S' => Self::short(),
            b'I' => Self::int(),
            b'J' => Self::long(),
            b'F' => Self::float(),
            b'D' => Self::double(),
            b'V' => Self::void(),
            x => {
                return Err(Error::malformed(format!(
                    "unknown primitive type code {:?}",
                    x as char
                )))
            }
        })
    }

    /// A class type from either a dotted (`java.lang.String`) or internal
    /// (`java/lang/String`) name.
    pub fn object(name: &str) -> TypeDesc {
        intern(TypeKind::Object(name.replace('.', "/")))
    }

    pub fn array_of(component: &TypeDesc) -> Result<TypeDesc> {
        if component.is_void() {
            return Err(Error::Illegal("array of void".to_string()));
        }

        Ok(intern(TypeKind::Array(component.clone())))
    }

    /// Strict parse of an internal-form field descriptor such as
    /// `Ljava/lang/String;` or `[[I`.
    pub fn parse(descriptor: &str) -> Result<TypeDesc> {
        let bytes = descriptor.as_bytes();
        let mut pos = 0;
        let ty = parse_type(bytes, &mut pos)?;

        if pos != bytes.len() {
            return Err(Error::malformed(format!(
                "trailing characters in descriptor {:?}",
                descriptor
            )));
        }

        Ok(ty)
    }

    pub fn kind(&self) -> &TypeKind {
        &self.inner.kind
    }

    /// The internal descriptor form, e.g. `Ljava/lang/String;` or `[I`.
    pub fn descriptor(&self) -> &str {
        &self.inner.descriptor
    }

    /// The human readable dotted form, e.g. `java.lang.String` or `int[]`.
    pub fn display_name(&self) -> String {
        match self.kind() {
            TypeKind::Boolean => "boolean".to_string(),
            TypeKind::Byte => "byte".to_string(),
            TypeKind::Char => "char".to_string(),
            TypeKind::Short => "short".to_string(),
            TypeKind::Int => "int".to_string(),
            TypeKind::Long => "long".to_string(),
            TypeKind::Float => "float".to_string(),
            TypeKind::Double => "double".to_string(),
            TypeKind::Void => "void".to_string(),
            TypeKind::Object(name) => name.replace('/', "."),
            TypeKind::Array(component) => format!("{}[]", component.display_name()),
        }
    }

    /// The name used by a CONSTANT_Class entry: the plain internal name for
    /// object types and the full descriptor for array types. Primitives have
    /// no class constant form.
    pub fn class_internal_name(&self) -> Option<&str> {
        match self.kind() {
            TypeKind::Object(name) => Some(name),
            TypeKind::Array(_) => Some(self.descriptor()),
            _ => None,
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self.kind(), TypeKind::Void)
    }

    pub fn is_primitive(&self) -> bool {
        !matches!(
            self.kind(),
            TypeKind::Object(_) | TypeKind::Array(_) | TypeKind::Void
        )
    }

    pub fn is_reference(&self) -> bool {
        matches!(self.kind(), TypeKind::Object(_) | TypeKind::Array(_))
    }

    pub fn is_double_word(&self) -> bool {
        matches!(self.kind(), TypeKind::Long | TypeKind::Double)
    }

    /// Operand stack and local variable slots taken by a value of this type.
    /// `void` occupies none.
    pub fn word_size(&self) -> u16 {
        match self.kind() {
            TypeKind::Void => 0,
            TypeKind::Long | TypeKind::Double => 2,
            _ => 1,
        }
    }

    /// Component type of an array, one rank down.
    pub fn element_type(&self) -> Option<&TypeDesc> {
        match self.kind() {
            TypeKind::Array(component) => Some(component),
            _ => None,
        }
    }

    pub fn rank(&self) -> u8 {
        match self.kind() {
            TypeKind::Array(component) => 1 + component.rank(),
            _ => 0,
        }
    }
}

fn parse_type(bytes: &[u8], pos: &mut usize) -> Result<TypeDesc> {
    let start = *pos;
    let code = *bytes
        .get(*pos)
        .ok_or_else(|| Error::malformed("truncated descriptor"))?;
    *pos += 1;

    Ok(match code {
        b'Z' | b'B' | b'C' | b'S' | b'I' | b'J' | b'F' | b'D' | b'V' => TypeDesc::primitive(code)?,
        b'[' => {
            let component = parse_type(bytes, pos)?;
            TypeDesc::array_of(&component)?
        }
        b'L' => {
            let name_start = *pos;
            loop {
                match bytes.get(*pos) {
                    Some(b';') => break,
                    Some(_) => *pos += 1,
                    None => return Err(Error::malformed("unterminated class descriptor")),
                }
            }

            let name = std::str::from_utf8(&bytes[name_start..*pos])
                .map_err(|e| Error::malformed(format!("descriptor is not UTF-8: {}", e)))?;
            if name.is_empty() {
                return Err(Error::malformed("empty class name in descriptor"));
            }
            *pos += 1;
            intern(TypeKind::Object(name.to_string()))
        }
        x => {
            return Err(Error::malformed(format!(
                "unexpected descriptor character {:?} at offset {}",
                x as char, start
            )))
        }
    })
}

impl PartialEq for TypeDesc {
    fn eq(&self, other: &Self) -> bool {
        // Interning guarantees equal descriptors share the allocation.
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for TypeDesc {}

impl Hash for TypeDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.descriptor.hash(state);
    }
}

impl Display for TypeDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor())
    }
}

impl Debug for TypeDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

/// A method descriptor: ordered parameter types and a return type.
#[derive(Clone, PartialEq, Eq)]
pub struct MethodDesc {
    params: Vec<TypeDesc>,
    returns: TypeDesc,
    descriptor: String,
}

impl MethodDesc {
    pub fn new(returns: TypeDesc, params: Vec<TypeDesc>) -> Result<MethodDesc> {
        for param in &params {
            if param.is_void() {
                return Err(Error::Illegal("void method parameter".to_string()));
            }
        }

        let mut descriptor = String::from("(");
        for param in &params {
            descriptor.push_str(param.descriptor());
        }
        descriptor.push(')');
        descriptor.push_str(returns.descriptor());

        Ok(MethodDesc {
            params,
            returns,
            descriptor,
        })
    }

    /// Strict parse of a method descriptor such as `(ILjava/lang/String;)V`.
    pub fn parse(descriptor: &str) -> Result<MethodDesc> {
        let bytes = descriptor.as_bytes();
        if bytes.first() != Some(&b'(') {
            return Err(Error::malformed(format!(
                "method descriptor {:?} does not start with '('",
                descriptor
            )));
        }

        let mut pos = 1;
        let mut params = Vec::new();
        loop {
            match bytes.get(pos) {
                Some(b')') => {
                    pos += 1;
                    break;
                }
                Some(_) => {
                    let param = parse_type(bytes, &mut pos)?;
                    if param.is_void() {
                        return Err(Error::malformed("void method parameter"));
                    }
                    params.push(param);
                }
                None => return Err(Error::malformed("unterminated method descriptor")),
            }
        }

        let returns = parse_type(bytes, &mut pos)?;
        if pos != bytes.len() {
            return Err(Error::malformed(format!(
                "trailing characters in method descriptor {:?}",
                descriptor
            )));
        }

        MethodDesc::new(returns, params)
    }

    pub fn descriptor(&self) -> &str {
        &self.descriptor
    }

    pub fn params(&self) -> &[TypeDesc] {
        &self.params
    }

    pub fn returns(&self) -> &TypeDesc {
        &self.returns
    }

    pub fn returns_void(&self) -> bool {
        self.returns.is_void()
    }

    /// Local variable slots taken by the parameters, double words counted
    /// twice. The receiver is not included.
    pub fn param_words(&self) -> u16 {
        self.params.iter().map(TypeDesc::word_size).sum()
    }
}

impl Display for MethodDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.descriptor)
    }
}

impl Debug for MethodDesc {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        <Self as Display>::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_identity() {
        let a = TypeDesc::object("java.lang.String");
        let b = TypeDesc::parse("Ljava/lang/String;").unwrap();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
        assert_eq!(a, b);
    }

    #[test]
    fn array_descriptors() {
        let ints = TypeDesc::array_of(&TypeDesc::int()).unwrap();
        let matrix = TypeDesc::array_of(&ints).unwrap();
        assert_eq!(matrix.descriptor(), "[[I");
        assert_eq!(matrix.rank(), 2);
        assert_eq!(matrix.display_name(), "int[][]");
        assert_eq!(TypeDesc::parse("[[I").unwrap(), matrix);
    }

    #[test]
    fn class_internal_names() {
        let string = TypeDesc::object("java/lang/String");
        assert_eq!(string.class_internal_name(), Some("java/lang/String"));

        let array = TypeDesc::array_of(&string).unwrap();
        assert_eq!(array.class_internal_name(), Some("[Ljava/lang/String;"));

        assert_eq!(TypeDesc::int().class_internal_name(), None);
    }

    #[test]
    fn rejects_malformed() {
        assert!(TypeDesc::parse("Q").is_err());
        assert!(TypeDesc::parse("Ljava/lang/String").is_err());
        assert!(TypeDesc::parse("II").is_err());
        assert!(TypeDesc::parse("[").is_err());
        assert!(MethodDesc::parse("()").is_err());
        assert!(MethodDesc::parse("(V)V").is_err());
        assert!(MethodDesc::parse("I").is_err());
    }

    #[test]
    fn method_descriptor_round_trip() {
        let desc = MethodDesc::parse("(ILjava/lang/String;[J)V").unwrap();
        assert_eq!(desc.descriptor(), "(ILjava/lang/String;[J)V");
        assert_eq!(desc.params().len(), 3);
        assert_eq!(desc.param_words(), 4);
        assert!(desc.returns_void());
    }

    #[test]
    fn word_sizes() {
        assert!(TypeDesc::long().is_double_word());
        assert!(TypeDesc::double().is_double_word());
        assert_eq!(TypeDesc::long().word_size(), 2);
        assert_eq!(TypeDesc::int().word_size(), 1);
        assert_eq!(TypeDesc::void().word_size(), 0);
    }
}
