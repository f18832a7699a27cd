//! Struct and union layout
//!
//! Turns a list of already realized field types into byte offsets, bit-field
//! positions, a total size and an alignment, following the usual C rules on
//! LP64 targets:
//!
//! - each field is aligned to its type's alignment (to 1 when packed),
//!   unless it carries an explicit offset
//! - consecutive bit-fields share a storage unit of their type's size while
//!   the bits fit; `:0` closes the current unit
//! - union fields all sit at offset 0
//! - the total size is rounded up to the alignment; an empty aggregate has
//!   size 1 unless an explicit size says otherwise
//!
//! Explicit offsets, sizes and alignments win over computed ones.  A
//! disagreement marks the layout with `custom_field_pos`, or is an error
//! when the declaration asked for `check_fields`.

use rustc_hash::FxHashSet;

use crate::errors::LayoutError;
use crate::types::descr::{BitField, FieldInfo, StructLayout, StructState};
use crate::types::{TypeId, TypeUniverse};

/// A field to lay out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Empty for an unnamed field
    pub name: String,
    pub ty: TypeId,
    pub bit_width: Option<u32>,
    /// Explicit byte offset
    pub offset: Option<usize>,
}

impl FieldSpec {
    pub fn new(name: &str, ty: TypeId) -> Self {
        FieldSpec {
            name: name.to_string(),
            ty,
            bit_width: None,
            offset: None,
        }
    }

    pub fn bits(mut self, width: u32) -> Self {
        self.bit_width = Some(width);
        self
    }

    pub fn at(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Whole-aggregate options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutOptions {
    pub total_size: Option<usize>,
    pub total_alignment: Option<usize>,
    pub packed: bool,
    pub check_fields: bool,
}

/// Storage unit shared by consecutive bit-fields
#[derive(Debug, Clone, Copy)]
struct BitUnit {
    offset: usize,
    size: usize,
    used: u32,
}

fn align_up(offset: usize, alignment: usize) -> Option<usize> {
    offset.checked_next_multiple_of(alignment.max(1))
}

impl TypeUniverse {
    /// Compute and install the layout of a struct or union.
    ///
    /// The fields' types must already be complete where their size matters:
    /// a by-value field of a struct that is still pending is an error here.
    ///
    /// # Panics
    ///
    /// Panics if `id` is not a struct or union, or is already complete.
    pub fn complete_struct(
        &mut self,
        id: TypeId,
        fields: &[FieldSpec],
        options: LayoutOptions,
    ) -> Result<(), LayoutError> {
        let descr = self.get(id);
        let owner = descr.name.clone();
        let is_union = descr.is_union();
        match descr.struct_state() {
            Some(StructState::Complete(_)) => panic!("'{}' is already complete", owner),
            None => panic!("'{}' is not a struct or union", owner),
            Some(_) => {}
        }

        let mut seen = FxHashSet::default();
        let mut infos = Vec::with_capacity(fields.len());
        let mut offset = 0usize;
        let mut end = 0usize;
        let mut alignment = 1usize;
        let mut custom_field_pos = false;
        let mut varsize = false;
        let mut unit: Option<BitUnit> = None;
        let too_large = |owner: &str| LayoutError::TooLarge {
            owner: owner.to_string(),
        };

        for (i, field) in fields.iter().enumerate() {
            if !field.name.is_empty() && !seen.insert(field.name.as_str()) {
                return Err(LayoutError::DuplicateField {
                    owner,
                    field: field.name.clone(),
                });
            }

            let ftype = self.get(field.ty);
            let is_last = i + 1 == fields.len();
            let open_array = ftype.is_array() && ftype.array_length().is_none();
            let fsize = match ftype.size {
                Some(size) => size,
                None if open_array && is_last && field.bit_width.is_none() => {
                    varsize = true;
                    0
                }
                None => {
                    return Err(LayoutError::UnknownFieldSize {
                        owner,
                        field: field.name.clone(),
                        ctype: ftype.name.clone(),
                    });
                }
            };
            let falign = if options.packed {
                1
            } else {
                self.alignment_of(field.ty).unwrap_or(1)
            };
            alignment = alignment.max(falign);

            let Some(width) = field.bit_width else {
                unit = None;
                let natural = if is_union {
                    0
                } else {
                    align_up(offset, falign).ok_or_else(|| too_large(owner.as_str()))?
                };
                let field_offset = match field.offset {
                    Some(forced) if forced != natural => {
                        if options.check_fields {
                            return Err(LayoutError::Mismatch {
                                owner,
                                what: format!("offset of field '{}'", field.name),
                                declared: forced,
                                computed: natural,
                            });
                        }
                        custom_field_pos = true;
                        forced
                    }
                    _ => natural,
                };
                let field_end = field_offset.checked_add(fsize).ok_or_else(|| too_large(owner.as_str()))?;
                if !is_union {
                    offset = field_end;
                }
                end = end.max(field_end);
                infos.push(FieldInfo {
                    name: field.name.clone(),
                    ty: field.ty,
                    offset: field_offset,
                    bitfield: None,
                });
                continue;
            };

            if field.offset.is_some() {
                return Err(LayoutError::BitFieldWithOffset {
                    owner,
                    field: field.name.clone(),
                });
            }
            if !ftype.is_integer() {
                return Err(LayoutError::BitFieldNotInteger {
                    owner,
                    field: field.name.clone(),
                    ctype: ftype.name.clone(),
                });
            }
            let bits = fsize * 8;
            if width as usize > bits {
                return Err(LayoutError::BitFieldTooWide {
                    owner,
                    field: field.name.clone(),
                    ctype: ftype.name.clone(),
                    width,
                });
            }
            // `:0` only closes the current unit, whatever its type
            if width == 0 {
                if !field.name.is_empty() {
                    return Err(LayoutError::NamedZeroWidth {
                        owner,
                        field: field.name.clone(),
                    });
                }
                unit = None;
                if !is_union {
                    offset = align_up(offset, falign).ok_or_else(|| too_large(owner.as_str()))?;
                }
                continue;
            }
            if let Some(current) = unit {
                if current.size != fsize {
                    return Err(LayoutError::BitFieldTypeMismatch {
                        owner,
                        field: field.name.clone(),
                        size: fsize,
                        previous: current.size,
                    });
                }
            }

            let (unit_offset, shift) = match unit {
                Some(current) if !is_union && (current.used + width) as usize <= bits => {
                    (current.offset, current.used)
                }
                _ => {
                    let start = if is_union {
                        0
                    } else {
                        align_up(offset, falign).ok_or_else(|| too_large(owner.as_str()))?
                    };
                    if !is_union {
                        offset = start.checked_add(fsize).ok_or_else(|| too_large(owner.as_str()))?;
                    }
                    (start, 0)
                }
            };
            unit = Some(BitUnit {
                offset: unit_offset,
                size: fsize,
                used: shift + width,
            });
            end = end.max(unit_offset.checked_add(fsize).ok_or_else(|| too_large(owner.as_str()))?);
            infos.push(FieldInfo {
                name: field.name.clone(),
                ty: field.ty,
                offset: unit_offset,
                bitfield: Some(BitField { shift, width }),
            });
        }

        let used = end.max(offset);
        let computed = align_up(used, alignment).ok_or_else(|| too_large(owner.as_str()))?;
        let size = match options.total_size {
            Some(total) => {
                if total < used {
                    return Err(LayoutError::SizeTooSmall {
                        owner,
                        size: total,
                        needed: used,
                    });
                }
                if total != computed {
                    if options.check_fields {
                        return Err(LayoutError::Mismatch {
                            owner,
                            what: "total size".to_string(),
                            declared: total,
                            computed,
                        });
                    }
                    custom_field_pos = true;
                }
                total
            }
            None if computed == 0 => 1,
            None => computed,
        };
        let alignment = match options.total_alignment {
            Some(declared) if declared != alignment => {
                if options.check_fields {
                    return Err(LayoutError::Mismatch {
                        owner,
                        what: "total alignment".to_string(),
                        declared,
                        computed: alignment,
                    });
                }
                custom_field_pos = true;
                declared
            }
            _ => alignment,
        };

        log::debug!(
            "completed '{}': size {}, alignment {}, {} fields{}",
            owner,
            size,
            alignment,
            infos.len(),
            if custom_field_pos { ", custom layout" } else { "" }
        );

        let layout = StructLayout::new(infos, custom_field_pos, options.packed, varsize);
        let descr = self.get_mut(id);
        descr.size = Some(size);
        descr.align_or_length = Some(alignment);
        if let Some(state) = descr.struct_state_mut() {
            *state = StructState::Complete(layout);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::primitives::PrimitiveType;
    use crate::types::LocalTypes;

    struct Fixture {
        universe: TypeUniverse,
        local: LocalTypes,
    }

    impl Fixture {
        fn new() -> Self {
            Fixture {
                universe: TypeUniverse::new(),
                local: LocalTypes::new(),
            }
        }

        fn prim(&mut self, prim: PrimitiveType) -> TypeId {
            self.universe.primitive(prim)
        }

        fn aggregate(&mut self, tag: &str, is_union: bool) -> TypeId {
            self.universe.new_struct(
                &mut self.local,
                tag,
                is_union,
                StructState::Pending { index: 0 },
                None,
                None,
            )
        }

        fn layout(&self, id: TypeId) -> &StructLayout {
            self.universe.get(id).layout().expect("complete")
        }

        fn offsets(&self, id: TypeId) -> Vec<usize> {
            self.layout(id).fields.iter().map(|f| f.offset).collect()
        }
    }

    #[test]
    fn test_struct_padding() {
        let mut fx = Fixture::new();
        let char_ = fx.prim(PrimitiveType::Char);
        let int = fx.prim(PrimitiveType::Int);
        let double = fx.prim(PrimitiveType::Double);
        let s = fx.aggregate("s", false);
        let fields = [
            FieldSpec::new("c", char_),
            FieldSpec::new("i", int),
            FieldSpec::new("d", double),
            FieldSpec::new("e", char_),
        ];
        fx.universe
            .complete_struct(s, &fields, LayoutOptions::default())
            .unwrap();

        assert_eq!(fx.offsets(s), vec![0, 4, 8, 16]);
        assert_eq!(fx.universe.get(s).size, Some(24));
        assert_eq!(fx.universe.alignment_of(s), Some(8));
        assert!(!fx.layout(s).custom_field_pos);
    }

    #[test]
    fn test_packed_struct() {
        let mut fx = Fixture::new();
        let char_ = fx.prim(PrimitiveType::Char);
        let int = fx.prim(PrimitiveType::Int);
        let s = fx.aggregate("p", false);
        let options = LayoutOptions {
            packed: true,
            ..Default::default()
        };
        fx.universe
            .complete_struct(s, &[FieldSpec::new("c", char_), FieldSpec::new("i", int)], options)
            .unwrap();

        assert_eq!(fx.offsets(s), vec![0, 1]);
        assert_eq!(fx.universe.get(s).size, Some(5));
        assert_eq!(fx.universe.alignment_of(s), Some(1));
        assert!(fx.layout(s).packed);
    }

    #[test]
    fn test_union_layout() {
        let mut fx = Fixture::new();
        let char_ = fx.prim(PrimitiveType::Char);
        let double = fx.prim(PrimitiveType::Double);
        let int = fx.prim(PrimitiveType::Int);
        let mut local = LocalTypes::new();
        let int_p = fx.universe.pointer_to(&mut local, int);
        let three = fx.universe.array_of(&mut local, int_p, Some(3)).unwrap();
        let u = fx.aggregate("u", true);
        let fields = [
            FieldSpec::new("c", char_),
            FieldSpec::new("d", double),
            FieldSpec::new("a", three),
        ];
        fx.universe
            .complete_struct(u, &fields, LayoutOptions::default())
            .unwrap();

        assert_eq!(fx.offsets(u), vec![0, 0, 0]);
        assert_eq!(fx.universe.get(u).size, Some(16));
        assert_eq!(fx.universe.alignment_of(u), Some(8));
    }

    #[test]
    fn test_bitfields_share_a_unit() {
        let mut fx = Fixture::new();
        let uint = fx.prim(PrimitiveType::UInt);
        let s = fx.aggregate("flags", false);
        let fields = [
            FieldSpec::new("a", uint).bits(3),
            FieldSpec::new("b", uint).bits(5),
            FieldSpec::new("c", uint).bits(1),
        ];
        fx.universe
            .complete_struct(s, &fields, LayoutOptions::default())
            .unwrap();

        let layout = fx.layout(s);
        let shifts: Vec<u32> = layout
            .fields
            .iter()
            .map(|f| f.bitfield.expect("bit-field").shift)
            .collect();
        assert_eq!(shifts, vec![0, 3, 8]);
        assert_eq!(fx.offsets(s), vec![0, 0, 0]);
        assert_eq!(fx.universe.get(s).size, Some(4));
    }

    #[test]
    fn test_bitfield_overflow_starts_new_unit() {
        let mut fx = Fixture::new();
        let uchar = fx.prim(PrimitiveType::UChar);
        let s = fx.aggregate("bytes", false);
        let fields = [
            FieldSpec::new("lo", uchar).bits(6),
            FieldSpec::new("hi", uchar).bits(6),
            FieldSpec::new("", uchar).bits(0),
            FieldSpec::new("next", uchar).bits(1),
        ];
        fx.universe
            .complete_struct(s, &fields, LayoutOptions::default())
            .unwrap();

        let layout = fx.layout(s);
        assert_eq!(layout.fields.len(), 3);
        assert_eq!(fx.offsets(s), vec![0, 1, 2]);
        assert_eq!(layout.field("hi").unwrap().bitfield, Some(BitField { shift: 0, width: 6 }));
        assert_eq!(fx.universe.get(s).size, Some(3));
    }

    #[test]
    fn test_bitfield_errors() {
        let mut fx = Fixture::new();
        let uint = fx.prim(PrimitiveType::UInt);
        let ushort = fx.prim(PrimitiveType::UShort);
        let double = fx.prim(PrimitiveType::Double);

        let s = fx.aggregate("a", false);
        let err = fx
            .universe
            .complete_struct(s, &[FieldSpec::new("x", uint).bits(33)], LayoutOptions::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::BitFieldTooWide { width: 33, .. }));

        let err = fx
            .universe
            .complete_struct(s, &[FieldSpec::new("x", double).bits(3)], LayoutOptions::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::BitFieldNotInteger { .. }));

        let fields = [FieldSpec::new("x", uint).bits(3), FieldSpec::new("y", ushort).bits(3)];
        let err = fx
            .universe
            .complete_struct(s, &fields, LayoutOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::BitFieldTypeMismatch {
                owner: "struct a".to_string(),
                field: "y".to_string(),
                size: 2,
                previous: 4,
            }
        );

        let err = fx
            .universe
            .complete_struct(s, &[FieldSpec::new("z", uint).bits(0)], LayoutOptions::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::NamedZeroWidth { .. }));

        let err = fx
            .universe
            .complete_struct(s, &[FieldSpec::new("w", uint).bits(2).at(0)], LayoutOptions::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::BitFieldWithOffset { .. }));

        // failures leave the struct incomplete
        assert!(fx.universe.get(s).layout().is_none());
    }

    #[test]
    fn test_zero_width_closes_unit_of_any_type() {
        let mut fx = Fixture::new();
        let uint = fx.prim(PrimitiveType::UInt);
        let uchar = fx.prim(PrimitiveType::UChar);

        let s = fx.aggregate("split", false);
        let fields = [
            FieldSpec::new("a", uint).bits(3),
            FieldSpec::new("", uchar).bits(0),
            FieldSpec::new("b", uint).bits(3),
        ];
        fx.universe
            .complete_struct(s, &fields, LayoutOptions::default())
            .unwrap();
        assert_eq!(fx.offsets(s), vec![0, 4]);
        assert_eq!(fx.universe.get(s).size, Some(8));
    }

    #[test]
    fn test_forced_offset_past_address_space() {
        let mut fx = Fixture::new();
        let int = fx.prim(PrimitiveType::Int);
        let s = fx.aggregate("huge", false);

        let err = fx
            .universe
            .complete_struct(s, &[FieldSpec::new("a", int).at(usize::MAX - 1)], LayoutOptions::default())
            .unwrap_err();
        assert_eq!(
            err,
            LayoutError::TooLarge {
                owner: "struct huge".to_string()
            }
        );

        let fields = [FieldSpec::new("a", int).at(usize::MAX - 4), FieldSpec::new("b", int)];
        let err = fx
            .universe
            .complete_struct(s, &fields, LayoutOptions::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::TooLarge { .. }));
        assert!(fx.universe.get(s).layout().is_none());
    }

    #[test]
    fn test_empty_struct_has_size_one() {
        let mut fx = Fixture::new();
        let s = fx.aggregate("empty", false);
        fx.universe
            .complete_struct(s, &[], LayoutOptions::default())
            .unwrap();
        assert_eq!(fx.universe.get(s).size, Some(1));

        let t = fx.aggregate("empty_sized", false);
        let options = LayoutOptions {
            total_size: Some(0),
            total_alignment: Some(1),
            ..Default::default()
        };
        fx.universe.complete_struct(t, &[], options).unwrap();
        assert_eq!(fx.universe.get(t).size, Some(0));
    }

    #[test]
    fn test_explicit_offsets_and_sizes() {
        let mut fx = Fixture::new();
        let int = fx.prim(PrimitiveType::Int);
        let s = fx.aggregate("custom", false);
        let fields = [FieldSpec::new("a", int), FieldSpec::new("b", int).at(8)];
        let options = LayoutOptions {
            total_size: Some(16),
            ..Default::default()
        };
        fx.universe.complete_struct(s, &fields, options).unwrap();
        assert_eq!(fx.offsets(s), vec![0, 8]);
        assert_eq!(fx.universe.get(s).size, Some(16));
        assert!(fx.layout(s).custom_field_pos);

        let t = fx.aggregate("checked", false);
        let options = LayoutOptions {
            check_fields: true,
            ..Default::default()
        };
        let err = fx.universe.complete_struct(t, &fields, options).unwrap_err();
        assert!(matches!(err, LayoutError::Mismatch { declared: 8, computed: 4, .. }));

        let u = fx.aggregate("small", false);
        let options = LayoutOptions {
            total_size: Some(4),
            ..Default::default()
        };
        let fields = [FieldSpec::new("a", int), FieldSpec::new("b", int)];
        let err = fx.universe.complete_struct(u, &fields, options).unwrap_err();
        assert!(matches!(err, LayoutError::SizeTooSmall { size: 4, needed: 8, .. }));
    }

    #[test]
    fn test_flexible_array_member() {
        let mut fx = Fixture::new();
        let int = fx.prim(PrimitiveType::Int);
        let char_ = fx.prim(PrimitiveType::Char);
        let mut local = LocalTypes::new();
        let char_p = fx.universe.pointer_to(&mut local, char_);
        let open = fx.universe.array_of(&mut local, char_p, None).unwrap();

        let s = fx.aggregate("message", false);
        let fields = [FieldSpec::new("len", int), FieldSpec::new("data", open)];
        fx.universe
            .complete_struct(s, &fields, LayoutOptions::default())
            .unwrap();
        assert_eq!(fx.offsets(s), vec![0, 4]);
        assert_eq!(fx.universe.get(s).size, Some(4));
        assert!(fx.layout(s).varsize);

        // only as the last field
        let t = fx.aggregate("broken", false);
        let fields = [FieldSpec::new("data", open), FieldSpec::new("len", int)];
        let err = fx
            .universe
            .complete_struct(t, &fields, LayoutOptions::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::UnknownFieldSize { .. }));
    }

    #[test]
    fn test_duplicate_and_incomplete_fields() {
        let mut fx = Fixture::new();
        let int = fx.prim(PrimitiveType::Int);
        let s = fx.aggregate("dup", false);
        let fields = [FieldSpec::new("x", int), FieldSpec::new("x", int)];
        let err = fx
            .universe
            .complete_struct(s, &fields, LayoutOptions::default())
            .unwrap_err();
        assert!(matches!(err, LayoutError::DuplicateField { .. }));

        let inner = fx.aggregate("inner", false);
        let t = fx.aggregate("outer", false);
        let err = fx
            .universe
            .complete_struct(t, &[FieldSpec::new("i", inner)], LayoutOptions::default())
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "field 'struct outer.i' has ctype 'struct inner' of unknown size"
        );
    }

    #[test]
    #[should_panic(expected = "already complete")]
    fn test_completing_twice_panics() {
        let mut fx = Fixture::new();
        let s = fx.aggregate("once", false);
        fx.universe
            .complete_struct(s, &[], LayoutOptions::default())
            .unwrap();
        let _ = fx.universe.complete_struct(s, &[], LayoutOptions::default());
    }
}
