use ash::{Device as DeviceHandle, vk};

#[derive(Clone, Copy, Debug)]
enum Write {
    Buffer {
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    },
    Image {
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorImageInfo,
    },
}

/// Collects descriptor writes and flushes them into one set with a single update call.
#[derive(Debug, Default)]
pub struct DescriptorWriter {
    writes: Vec<Write>,
}

impl DescriptorWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.writes.push(Write::Buffer {
            binding,
            ty,
            info: vk::DescriptorBufferInfo::default()
                .buffer(buffer)
                .offset(offset)
                .range(size),
        });
        self
    }

    pub fn write_image(
        &mut self,
        binding: u32,
        image_view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.writes.push(Write::Image {
            binding,
            ty,
            info: vk::DescriptorImageInfo::default()
                .image_view(image_view)
                .sampler(sampler)
                .image_layout(layout),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn clear(&mut self) {
        self.writes.clear();
    }

    pub fn update_set(&self, device_handle: &DeviceHandle, set: vk::DescriptorSet) {
        let buffer_infos: Vec<_> = self
            .writes
            .iter()
            .map(|write| match write {
                Write::Buffer { info, .. } => [*info],
                Write::Image { .. } => [vk::DescriptorBufferInfo::default()],
            })
            .collect();
        let image_infos: Vec<_> = self
            .writes
            .iter()
            .map(|write| match write {
                Write::Image { info, .. } => [*info],
                Write::Buffer { .. } => [vk::DescriptorImageInfo::default()],
            })
            .collect();

        let writes: Vec<_> = self
            .writes
            .iter()
            .enumerate()
            .map(|(i, write)| match write {
                Write::Buffer { binding, ty, .. } => vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .buffer_info(&buffer_infos[i]),
                Write::Image { binding, ty, .. } => vk::WriteDescriptorSet::default()
                    .dst_set(set)
                    .dst_binding(*binding)
                    .descriptor_type(*ty)
                    .image_info(&image_infos[i]),
            })
            .collect();

        unsafe { device_handle.update_descriptor_sets(&writes, &[]) };
    }
}
