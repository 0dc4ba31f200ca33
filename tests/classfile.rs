//! End to end scenarios: build a class through the public API, emit it, and
//! check the produced bytes and the parse round trip.

use classgen::class::attribute::{Attribute, StackMapFrame, VerificationTypeInfo};
use classgen::code::Comparison;
use classgen::{AccessFlags, ClassFile, ClassVersion, FieldConstant, MethodDesc, TypeDesc};

fn v1_6() -> ClassVersion {
    ClassVersion::from_name("1.6").unwrap()
}

fn string_type() -> TypeDesc {
    TypeDesc::object("java/lang/String")
}

/// All utf8 texts present in the pool of a class.
fn pool_texts(class: &ClassFile) -> Vec<String> {
    let pool = class.pool();
    (1..=pool.slots())
        .filter_map(|index| pool.get(index))
        .filter_map(|constant| constant.expect_utf8().map(str::to_string))
        .collect()
}

fn code_of<'a>(class: &'a ClassFile, method: usize) -> &'a classgen::class::attribute::CodeAttribute {
    class.methods()[method].code_attribute().expect("method has code")
}

#[test]
fn empty_public_class() {
    let mut class = ClassFile::new(v1_6(), "Foo", Some("java/lang/Object"));
    class.add_default_constructor().unwrap();

    let bytes = class.write().unwrap();
    assert_eq!(
        &bytes[..8],
        &[0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x32]
    );

    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    assert_eq!(parsed.name(), "Foo");
    assert_eq!(parsed.super_name(), Some("java/lang/Object"));
    assert_eq!(parsed.methods().len(), 1);
    assert_eq!(parsed.methods()[0].name(), "<init>");

    let code = code_of(&parsed, 0);
    assert_eq!(code.max_stack, 1);
    assert_eq!(code.max_locals, 1);

    // aload_0; invokespecial #x; return
    assert_eq!(code.code.len(), 5);
    assert_eq!(code.code[0], 0x2a);
    assert_eq!(code.code[1], 0xb7);
    assert_eq!(code.code[4], 0xb1);

    let init_ref = u16::from_be_bytes([code.code[2], code.code[3]]);
    let (class_name, name, descriptor) = parsed.pool().member_ref(init_ref).unwrap();
    assert_eq!(class_name, "java/lang/Object");
    assert_eq!(name, "<init>");
    assert_eq!(descriptor, "()V");

    // No branches, so no stack map table.
    assert!(code
        .attributes
        .iter()
        .all(|attribute| attribute.name() != "StackMapTable"));
}

#[test]
fn hello_world() {
    let mut class = ClassFile::new(v1_6(), "Hello", Some("java/lang/Object"));
    class.add_default_constructor().unwrap();

    let string_array = TypeDesc::array_of(&string_type()).unwrap();
    let main_desc = MethodDesc::new(TypeDesc::void(), vec![string_array]).unwrap();
    let main = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "main", &main_desc)
        .unwrap();

    {
        let mut code = class.code(main).unwrap();
        let print_stream = TypeDesc::object("java/io/PrintStream");
        code.get_static("java/lang/System", "out", &print_stream)
            .unwrap();
        code.load_string("Hello, world!").unwrap();
        let println = MethodDesc::new(TypeDesc::void(), vec![string_type()]).unwrap();
        code.invoke_virtual("java/io/PrintStream", "println", &println)
            .unwrap();
        code.return_void().unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();

    let code = code_of(&parsed, 1);
    assert_eq!(code.max_stack, 2);
    assert_eq!(code.max_locals, 1);

    let texts = pool_texts(&parsed);
    for expected in [
        "Hello, world!",
        "java/lang/System",
        "out",
        "Ljava/io/PrintStream;",
        "java/io/PrintStream",
        "println",
        "(Ljava/lang/String;)V",
    ] {
        assert!(
            texts.iter().any(|text| text == expected),
            "pool is missing {:?}",
            expected
        );
    }
}

#[test]
fn long_goto_expands_to_goto_w() {
    let mut class = ClassFile::new(v1_6(), "LongJump", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::void(), vec![]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        let end = code.new_label();
        code.branch(end);
        // 40000 bytes of straight line filler.
        for _ in 0..10_000 {
            code.load_int(1000).unwrap(); // sipush, 3 bytes
            code.pop(); // 1 byte
        }
        code.bind(end).unwrap();
        code.return_void().unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    assert_eq!(code.code[0], 0xc8, "expected goto_w");
    let target = i32::from_be_bytes([code.code[1], code.code[2], code.code[3], code.code[4]]);
    assert_eq!(target, 40_005);
}

#[test]
fn long_conditional_inverts_over_goto_w() {
    let mut class = ClassFile::new(v1_6(), "LongCond", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::void(), vec![TypeDesc::int()]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        let end = code.new_label();
        let arg = code.param(0).unwrap();
        code.load_local(arg).unwrap();
        code.if_zero(Comparison::Eq, end);
        for _ in 0..10_000 {
            code.load_int(1000).unwrap();
            code.pop();
        }
        code.bind(end).unwrap();
        code.return_void().unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    // iload_0; then ifne +8 jumping over a goto_w.
    assert_eq!(code.code[0], 0x1a);
    assert_eq!(code.code[1], 0x9a, "expected the inverted conditional");
    assert_eq!(i16::from_be_bytes([code.code[2], code.code[3]]), 8);
    assert_eq!(code.code[4], 0xc8, "expected goto_w after the inversion");
}

#[test]
fn branch_at_exactly_short_range_stays_short() {
    for (filler, expected_first) in [(32_764usize, 0xa7u8), (32_765, 0xc8)] {
        let mut class = ClassFile::new(v1_6(), "Boundary", Some("java/lang/Object"));
        let desc = MethodDesc::new(TypeDesc::void(), vec![]).unwrap();
        let method = class
            .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
            .unwrap();

        {
            let mut code = class.code(method).unwrap();
            let end = code.new_label();
            code.branch(end);
            for _ in 0..filler {
                code.nop();
            }
            code.bind(end).unwrap();
            code.return_void().unwrap();
        }

        let bytes = class.write().unwrap();
        let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
        let code = code_of(&parsed, 0);
        assert_eq!(
            code.code[0], expected_first,
            "offset {} should encode as {:#x}",
            filler + 3,
            expected_first
        );
    }
}

#[test]
fn dead_store_becomes_pop() {
    let mut class = ClassFile::new(v1_6(), "DeadStore", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::void(), vec![TypeDesc::int()]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        let unused = code.declare_local(Some("x"), &TypeDesc::int()).unwrap();
        code.load_int(42).unwrap();
        code.store_local(unused).unwrap();
        code.return_void().unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    // bipush 42; pop; return -- and no register reserved beyond the parameter.
    assert_eq!(code.code, vec![0x10, 42, 0x57, 0xb1]);
    assert_eq!(code.max_locals, 1);
}

#[test]
fn dead_double_store_becomes_pop2() {
    let mut class = ClassFile::new(v1_6(), "DeadStore2", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::void(), vec![]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        let unused = code.declare_local(Some("x"), &TypeDesc::long()).unwrap();
        code.load_long(7).unwrap();
        code.store_local(unused).unwrap();
        code.return_void().unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    // lconst... wait, load_long(7) goes through the pool: ldc2_w; pop2; return
    assert_eq!(code.code[0], 0x14);
    assert_eq!(code.code[3], 0x58);
    assert_eq!(code.code[4], 0xb1);
    assert_eq!(code.max_locals, 0);
}

#[test]
fn switch_form_selection() {
    let build = |cases: &[i32]| -> Vec<u8> {
        let mut class = ClassFile::new(v1_6(), "Switchy", Some("java/lang/Object"));
        let desc = MethodDesc::new(TypeDesc::void(), vec![TypeDesc::int()]).unwrap();
        let method = class
            .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
            .unwrap();

        {
            let mut code = class.code(method).unwrap();
            let arg = code.param(0).unwrap();
            let default = code.new_label();
            let labels: Vec<_> = cases.iter().map(|_| code.new_label()).collect();

            code.load_local(arg).unwrap();
            let pairs: Vec<_> = cases.iter().copied().zip(labels.iter().copied()).collect();
            code.switch_(&pairs, default).unwrap();

            for label in labels {
                code.bind(label).unwrap();
                code.return_void().unwrap();
            }
            code.bind(default).unwrap();
            code.return_void().unwrap();
        }

        let bytes = class.write().unwrap();
        let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
        code_of(&parsed, 0).code.clone()
    };

    // Dense cases take the table form, sparse ones the pair list.
    assert_eq!(build(&[1, 2, 3, 4, 5])[1], 0xaa);
    assert_eq!(build(&[1, 1000, 1_000_000])[1], 0xab);
}

#[test]
fn duplicate_switch_case_is_rejected() {
    let mut class = ClassFile::new(v1_6(), "BadSwitch", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::void(), vec![TypeDesc::int()]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    let mut code = class.code(method).unwrap();
    let default = code.new_label();
    let target = code.new_label();
    let result = code.switch_(&[(1, target), (1, target)], default);
    assert!(result.is_err());
}

#[test]
fn stack_map_merges_references_to_object() {
    let mut class = ClassFile::new(v1_6(), "Join", Some("java/lang/Object"));
    let object = TypeDesc::object("java/lang/Object");
    let desc = MethodDesc::new(object.clone(), vec![TypeDesc::int()]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "pick", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        let arg = code.param(0).unwrap();
        let boxed = code.new_label();
        let done = code.new_label();

        code.load_local(arg).unwrap();
        code.if_zero(Comparison::Ne, boxed);
        code.load_string("fallback").unwrap();
        code.branch(done);
        code.bind(boxed).unwrap();
        code.load_local(arg).unwrap();
        code.convert(&TypeDesc::int(), &TypeDesc::object("java/lang/Integer"))
            .unwrap();
        code.bind(done).unwrap();
        code.return_value(&object).unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    let table = code
        .attributes
        .iter()
        .find_map(|attribute| match attribute {
            Attribute::StackMapTable(table) => Some(table),
            _ => None,
        })
        .expect("branching method at version 50 carries a StackMapTable");

    // The join frame holds a single stack entry merged to java/lang/Object.
    let mut merged = false;
    for frame in &table.frames {
        let stack_top = match frame {
            StackMapFrame::SameLocals1StackItemFrame { stack, .. } => Some(stack),
            StackMapFrame::SameLocals1StackItemFrameExtended { stack, .. } => Some(stack),
            StackMapFrame::FullFrame { stack, .. } => stack.last(),
            _ => None,
        };

        if let Some(VerificationTypeInfo::Object { class_index }) = stack_top {
            if parsed.pool().class_name(*class_index).unwrap() == "java/lang/Object" {
                merged = true;
            }
        }
    }
    assert!(merged, "no frame with java/lang/Object on the stack");
}

#[test]
fn register_compaction_boundary() {
    let mut class = ClassFile::new(v1_6(), "Regs", Some("java/lang/Object"));
    let ints = vec![TypeDesc::int(); 5];
    let desc = MethodDesc::new(TypeDesc::int(), ints).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "sum", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        code.load_local(code.param(3).unwrap()).unwrap();
        code.load_local(code.param(4).unwrap()).unwrap();
        code.math(classgen::code::MathOp::Add, &TypeDesc::int())
            .unwrap();
        code.return_value(&TypeDesc::int()).unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    // Register 3 takes the compact form, register 4 the indexed one.
    assert_eq!(code.code[0], 0x1d);
    assert_eq!(&code.code[1..3], &[0x15, 4]);
}

#[test]
fn disjoint_locals_share_a_register() {
    let mut class = ClassFile::new(v1_6(), "Share", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::int(), vec![]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        let a = code.declare_local(Some("a"), &TypeDesc::int()).unwrap();
        let b = code.declare_local(Some("b"), &TypeDesc::int()).unwrap();

        code.load_int(1).unwrap();
        code.store_local(a).unwrap();
        code.load_local(a).unwrap();
        code.pop();
        code.load_int(2).unwrap();
        code.store_local(b).unwrap();
        code.load_local(b).unwrap();
        code.return_value(&TypeDesc::int()).unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    assert_eq!(code_of(&parsed, 0).max_locals, 1);
}

#[test]
fn overlapping_locals_get_distinct_registers() {
    let mut class = ClassFile::new(v1_6(), "NoShare", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::int(), vec![]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        let a = code.declare_local(Some("a"), &TypeDesc::int()).unwrap();
        let b = code.declare_local(Some("b"), &TypeDesc::int()).unwrap();

        code.load_int(1).unwrap();
        code.store_local(a).unwrap();
        code.load_int(2).unwrap();
        code.store_local(b).unwrap();
        code.load_local(a).unwrap();
        code.load_local(b).unwrap();
        code.math(classgen::code::MathOp::Add, &TypeDesc::int())
            .unwrap();
        code.return_value(&TypeDesc::int()).unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    assert_eq!(code_of(&parsed, 0).max_locals, 2);
}

#[test]
fn ldc_promotes_to_ldc_w_past_byte_indices() {
    let mut class = ClassFile::new(v1_6(), "BigPool", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::void(), vec![]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        for value in 0..300 {
            code.load_int(100_000 + value).unwrap();
            code.pop();
        }
        code.return_void().unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    assert_eq!(code.code[0], 0x12, "early constants use ldc");
    // The final load before pop/return sits 4 bytes from the end.
    let tail = code.code.len() - 5;
    assert_eq!(code.code[tail], 0x13, "late constants use ldc_w");
}

#[test]
fn convert_identity_inserts_nothing() {
    let mut class = ClassFile::new(v1_6(), "Ident", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::int(), vec![]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        code.load_int(1).unwrap();
        code.convert(&TypeDesc::int(), &TypeDesc::int()).unwrap();
        code.return_value(&TypeDesc::int()).unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    assert_eq!(code_of(&parsed, 0).code, vec![0x04, 0xac]);
}

#[test]
fn exception_handler_round_trip() {
    let mut class = ClassFile::new(v1_6(), "Catches", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::int(), vec![]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "run", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        let start = code.new_label();
        let end = code.new_label();
        let handler = code.new_label();

        code.bind(start).unwrap();
        code.load_int(1).unwrap();
        code.return_value(&TypeDesc::int()).unwrap();
        code.bind(end).unwrap();
        code.bind(handler).unwrap();
        code.pop();
        code.load_int(0).unwrap();
        code.return_value(&TypeDesc::int()).unwrap();

        code.exception_handler(start, end, handler, Some("java/lang/Exception"))
            .unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    assert_eq!(code.exception_table.len(), 1);
    let range = &code.exception_table[0];
    assert_eq!(range.start_pc, 0);
    assert_eq!(
        parsed.pool().class_name(range.catch_type).unwrap(),
        "java/lang/Exception"
    );
}

#[test]
fn serialize_parse_serialize_is_stable() {
    let mut class = ClassFile::new(v1_6(), "com.example.Rich", Some("java/lang/Object"));
    class.set_source_file("Rich.java");
    class.add_interface("java/io/Serializable").unwrap();
    class.set_debug_info(true);

    let counter = class
        .add_field(
            AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::FINAL,
            "LIMIT",
            &TypeDesc::int(),
        )
        .unwrap();
    class
        .field_mut(counter)
        .unwrap()
        .set_constant_value(FieldConstant::Int(100));

    let name_field = class
        .add_field(AccessFlags::PRIVATE, "name", &string_type())
        .unwrap();
    class.field_mut(name_field).unwrap().set_deprecated();

    class.add_default_constructor().unwrap();

    let getter_desc = MethodDesc::new(string_type(), vec![]).unwrap();
    let getter = class
        .add_method(AccessFlags::PUBLIC, "getName", &getter_desc)
        .unwrap();
    class
        .method_mut(getter)
        .unwrap()
        .add_exception("java/lang/IllegalStateException");
    {
        let mut code = class.code(getter).unwrap();
        code.load_this().unwrap();
        code.get_field("com/example/Rich", "name", &string_type())
            .unwrap();
        code.return_value(&string_type()).unwrap();
    }

    let first = class.write().unwrap();
    let mut parsed = ClassFile::read(&mut &first[..]).unwrap();
    let second = parsed.write().unwrap();
    assert_eq!(first, second);

    let mut reparsed = ClassFile::read(&mut &second[..]).unwrap();
    assert_eq!(reparsed.write().unwrap(), second);
}

#[test]
fn emission_is_repeatable() {
    let mut class = ClassFile::new(v1_6(), "Twice", Some("java/lang/Object"));
    class.add_default_constructor().unwrap();

    let first = class.write().unwrap();
    let second = class.write().unwrap();
    assert_eq!(first, second);
}

#[test]
fn mutation_after_emission_is_rejected() {
    let mut class = ClassFile::new(v1_6(), "Frozen", Some("java/lang/Object"));
    class.add_default_constructor().unwrap();
    class.write().unwrap();

    assert!(class.add_field(AccessFlags::PUBLIC, "late", &TypeDesc::int()).is_err());
    assert!(class.add_interface("java/io/Serializable").is_err());
}

#[test]
fn truncated_input_is_malformed() {
    let mut class = ClassFile::new(v1_6(), "Trunc", Some("java/lang/Object"));
    class.add_default_constructor().unwrap();
    let bytes = class.write().unwrap();

    assert!(ClassFile::read(&mut &bytes[..bytes.len() / 2]).is_err());
    assert!(ClassFile::read(&mut &[0u8, 1, 2, 3][..]).is_err());
}

#[test]
fn float_to_boolean_is_nan_safe_by_shape() {
    // The sequence compares with fcmpg for the negative test and fcmpl for
    // the positive test; both send NaN to the false side.
    let mut class = ClassFile::new(v1_6(), "NanBool", Some("java/lang/Object"));
    let desc = MethodDesc::new(TypeDesc::boolean(), vec![TypeDesc::float()]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "truthy", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        code.load_local(code.param(0).unwrap()).unwrap();
        code.convert(&TypeDesc::float(), &TypeDesc::boolean())
            .unwrap();
        code.return_value(&TypeDesc::boolean()).unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    let fcmpg = code.code.iter().filter(|b| **b == 0x96).count();
    let fcmpl = code.code.iter().filter(|b| **b == 0x95).count();
    assert_eq!(fcmpg, 1);
    assert_eq!(fcmpl, 1);
}

#[test]
fn boxed_to_boxed_conversion_branches_on_null() {
    let mut class = ClassFile::new(v1_6(), "Rebox", Some("java/lang/Object"));
    let integer = TypeDesc::object("java/lang/Integer");
    let long_box = TypeDesc::object("java/lang/Long");
    let desc = MethodDesc::new(long_box.clone(), vec![integer.clone()]).unwrap();
    let method = class
        .add_method(AccessFlags::PUBLIC | AccessFlags::STATIC, "widen", &desc)
        .unwrap();

    {
        let mut code = class.code(method).unwrap();
        code.load_local(code.param(0).unwrap()).unwrap();
        code.convert(&integer, &long_box).unwrap();
        code.return_value(&long_box).unwrap();
    }

    let bytes = class.write().unwrap();
    let parsed = ClassFile::read(&mut &bytes[..]).unwrap();
    let code = code_of(&parsed, 0);

    assert!(code.code.contains(&0xc6), "null check expected"); // ifnull
    assert!(code.code.contains(&0x85), "i2l expected");

    let texts = pool_texts(&parsed);
    for expected in ["intValue", "java/lang/Long", "(J)V"] {
        assert!(texts.iter().any(|text| text == expected), "missing {:?}", expected);
    }
}
