use canvas::{Uniform, UniformSet};

use crate::compile::UniformBlockLayout;

/// Serialises the scalar and vector uniforms into a std140 byte image.
///
/// A uniform whose kind changed since the layout was built keeps its previous
/// bytes; the layout is fixed once the pipeline is compiled.
pub(crate) fn write_block(layout: &UniformBlockLayout, uniforms: &UniformSet, out: &mut [u8]) {
    for field in layout.fields() {
        let Some(value) = uniforms.get(&field.name) else {
            continue;
        };
        if value.kind() != field.kind {
            tracing::trace!(uniform = %field.name, "uniform kind changed; keeping previous value");
            continue;
        }
        let bytes: &[u8] = match value {
            Uniform::Float(v) => bytemuck::bytes_of(v),
            Uniform::Int(v) => bytemuck::bytes_of(v),
            Uniform::Vec2(v) => bytemuck::cast_slice(v),
            Uniform::Vec3(v) => bytemuck::cast_slice(v),
            Uniform::Vec4(v) => bytemuck::cast_slice(v),
            Uniform::Texture(_) => continue,
        };
        if let Some(slot) = out.get_mut(field.offset..field.offset + bytes.len()) {
            slot.copy_from_slice(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use canvas::{UniformLayer, TIME_UNIFORM};

    use super::*;

    #[test]
    fn writes_values_at_layout_offsets() {
        let mut set = UniformSet::merge([UniformLayer::builtins().with("u_count", Uniform::Int(7))]);
        set.set_float(TIME_UNIFORM, 2.5);
        set.set_vec2("u_resolution", [640.0, 480.0]);
        let layout = UniformBlockLayout::from_uniforms(&set);
        let mut block = vec![0u8; layout.size()];

        write_block(&layout, &set, &mut block);

        let read_f32 = |offset: usize| f32::from_ne_bytes(block[offset..offset + 4].try_into().unwrap());
        assert_eq!(i32::from_ne_bytes(block[0..4].try_into().unwrap()), 7);
        assert_eq!(read_f32(4), 1.0);
        assert_eq!(read_f32(8), 640.0);
        assert_eq!(read_f32(12), 480.0);
        assert_eq!(read_f32(16), 2.5);
    }

    #[test]
    fn kind_changes_are_ignored() {
        let mut set = UniformSet::merge([UniformLayer::builtins()]);
        let layout = UniformBlockLayout::from_uniforms(&set);
        set.insert(TIME_UNIFORM, Uniform::Int(9));
        let mut block = vec![0u8; layout.size()];
        write_block(&layout, &set, &mut block);
        let offset = layout.field(TIME_UNIFORM).unwrap().offset;
        assert_eq!(&block[offset..offset + 4], &[0, 0, 0, 0]);
    }
}
