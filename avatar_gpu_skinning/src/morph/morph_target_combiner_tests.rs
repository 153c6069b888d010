use super::*;
use crate::graphics_device::mock_graphics_device::{
    MockCommandList, MockGraphicsDevice, MockShader, MockTexture,
};
use crate::morph::{CombinerVertex, NUM_INDICES_PER_QUAD};
use bytemuck::Zeroable;

// ============================================================================
// Helpers
// ============================================================================

struct Fixture {
    device: Arc<Mutex<MockGraphicsDevice>>,
    source: Arc<ExpandableTextureArray>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            device: Arc::new(Mutex::new(MockGraphicsDevice::new())),
            source: Arc::new(ExpandableTextureArray::new(
                Arc::new(MockTexture::new(512, 512, 16, "morph_source")),
            )),
        }
    }

    fn desc(&self) -> CombinerDesc {
        CombinerDesc::new(
            self.device.clone(),
            Arc::new(MockShader::new("combine")),
            self.source.clone(),
        )
    }

    fn combiner(&self) -> MorphTargetCombiner {
        MorphTargetCombiner::new(self.desc()).unwrap()
    }

    fn weights_contents(&self) -> Vec<f32> {
        self.device.lock().unwrap().last_buffer("morph_weights").unwrap().read_f32s()
    }
}

fn block(num_morph_targets: u32) -> MorphTargetBlockDesc {
    MorphTargetBlockDesc {
        texel_rect_in_source: TexelRect::new(0, 0, 64, 64),
        source_slice: 0,
        source_size: UVec2::new(512, 512),
        texel_rect_in_output: TexelRect::new(128, 0, 64, 64),
        output_size: UVec2::new(1024, 1024),
        num_morph_targets,
    }
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_new_creates_additive_pipeline_with_feature_defines() {
    let fixture = Fixture::new();
    let mut desc = fixture.desc();
    desc.features = CombineFeatures::HAS_TANGENTS | CombineFeatures::MORPH_10_10_10_2;
    let _combiner = MorphTargetCombiner::new(desc).unwrap();

    let device = fixture.device.lock().unwrap();
    let pipeline = &device.pipelines[0];
    assert_eq!(pipeline.label, "morph_target_combine");
    assert!(pipeline.additive_blend);
    assert_eq!(pipeline.defines, vec!["OVR_HAS_TANGENTS", "OVR_MORPH_10_10_10_2"]);
}

#[test]
fn test_ranges_uploaded_only_when_present() {
    let fixture = Fixture::new();
    let _plain = fixture.combiner();
    assert_eq!(fixture.device.lock().unwrap().buffer_count("morph_target_ranges"), 0);

    let mut desc = fixture.desc();
    desc.ranges = vec![Vec4::new(1.0, 2.0, 3.0, 4.0), Vec4::splat(0.5)];
    let _ranged = MorphTargetCombiner::new(desc).unwrap();

    let ranges = fixture.device.lock().unwrap().last_buffer("morph_target_ranges").unwrap();
    assert_eq!(ranges.desc.usage, BufferUsage::Uniform);
    assert_eq!(ranges.read_f32s(), vec![1.0, 2.0, 3.0, 4.0, 0.5, 0.5, 0.5, 0.5]);
}

#[test]
fn test_invalid_max_quads_rejected() {
    let fixture = Fixture::new();
    for max_quads in [0, MAX_QUADS + 1] {
        let mut desc = fixture.desc();
        desc.max_quads = max_quads;
        assert!(MorphTargetCombiner::new(desc).is_err());
    }
}

#[test]
fn test_features_defines() {
    assert!(CombineFeatures::empty().defines().is_empty());
    assert_eq!(CombineFeatures::MORPH_10_10_10_2.defines(), vec!["OVR_MORPH_10_10_10_2"]);
}

// ============================================================================
// Adding blocks
// ============================================================================

#[test]
fn test_add_block_grows_mesh_and_weights() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();

    let handle = combiner.add_morph_targets_to_mesh(&block(4)).unwrap().unwrap();

    assert_eq!(combiner.block_count(), 1);
    assert_eq!(combiner.quad_count(), 4);
    assert_eq!(combiner.weight_count(), 4);
    assert_eq!(combiner.morph_weights(handle).unwrap(), &[0.0; 4]);
    assert_eq!(combiner.block_layout(handle), Some(BlockLayout::new(0, 4)));
    assert_eq!(fixture.weights_contents(), vec![0.0; 4]);

    let data = combiner.block_data(handle).unwrap();
    assert_eq!(data.block_index, 0);
    assert_eq!(data.index_in_weights_buffer, 0);
    assert_eq!(data.num_morph_targets, 4);
}

#[test]
fn test_block_quads_reference_block_and_weights() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    combiner.add_morph_targets_to_mesh(&block(2)).unwrap().unwrap();
    combiner.add_morph_targets_to_mesh(&block(3)).unwrap().unwrap();

    // Second block: quads 2..5, block index 1, weights 2..5
    let quad = combiner.mesh().quad(3).unwrap();
    assert_eq!(quad[0].params, [1.0, 3.0, 1.0, 0.0]);
}

#[test]
fn test_zero_length_block_is_rejected() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();

    assert!(combiner.add_morph_targets_to_mesh(&block(0)).unwrap().is_none());
    assert_eq!(combiner.block_count(), 0);
    assert_eq!(combiner.quad_count(), 0);
    assert_eq!(fixture.device.lock().unwrap().buffer_count("morph_weights"), 0);
}

#[test]
fn test_rect_outside_texture_is_an_error() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let mut desc = block(2);
    desc.texel_rect_in_output = TexelRect::new(1000, 0, 64, 64);

    assert!(combiner.add_morph_targets_to_mesh(&desc).is_err());
    assert!(combiner.can_fit(MAX_QUADS));
}

#[test]
fn test_exhausted_layout_returns_none() {
    let fixture = Fixture::new();
    let mut desc = fixture.desc();
    desc.max_quads = 6;
    let mut combiner = MorphTargetCombiner::new(desc).unwrap();

    assert!(combiner.add_morph_targets_to_mesh(&block(4)).unwrap().is_some());
    assert!(combiner.can_fit(2));
    assert!(!combiner.can_fit(3));
    assert!(combiner.add_morph_targets_to_mesh(&block(3)).unwrap().is_none());
    assert_eq!(combiner.block_count(), 1);
}

#[test]
fn test_device_failure_rolls_back_block() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    fixture.device.lock().unwrap().fail_next_buffer = true;

    assert!(combiner.add_morph_targets_to_mesh(&block(3)).is_err());
    assert_eq!(combiner.block_count(), 0);
    assert!(combiner.can_fit(MAX_QUADS));

    let handle = combiner.add_morph_targets_to_mesh(&block(3)).unwrap().unwrap();
    assert_eq!(combiner.block_data(handle).unwrap().block_index, 0);
}

#[test]
fn test_growth_preserves_existing_weights() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();

    let a = combiner.add_morph_targets_to_mesh(&block(2)).unwrap().unwrap();
    combiner.morph_weights_mut(a).unwrap().copy_from_slice(&[0.25, 0.75]);
    combiner.morph_weights_update_complete(a).unwrap();

    let b = combiner.add_morph_targets_to_mesh(&block(3)).unwrap().unwrap();

    assert_eq!(fixture.weights_contents(), vec![0.25, 0.75, 0.0, 0.0, 0.0]);
    assert_eq!(combiner.morph_weights(a).unwrap(), &[0.25, 0.75]);
    assert_eq!(combiner.morph_weights(b).unwrap(), &[0.0; 3]);
    assert_eq!(fixture.device.lock().unwrap().buffer_count("morph_weights"), 2);
}

// ============================================================================
// Weights and drawing
// ============================================================================

#[test]
fn test_update_then_draw_issues_single_draw_call() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let a = combiner.add_morph_targets_to_mesh(&block(4)).unwrap().unwrap();

    combiner.morph_weights_mut(a).unwrap().copy_from_slice(&[0.1, 0.2, 0.3, 0.4]);
    assert!(combiner.morph_weights_update_complete(a).unwrap());
    assert!(combiner.is_dirty());
    assert_eq!(fixture.weights_contents(), vec![0.1, 0.2, 0.3, 0.4]);

    let mut cmd = MockCommandList::new();
    assert!(combiner.draw(&mut cmd).unwrap());

    assert_eq!(cmd.count("draw_indexed"), 1);
    assert!(cmd.commands.contains(&format!("draw_indexed:{}:0:0", 4 * NUM_INDICES_PER_QUAD)));
    assert!(cmd.commands.contains(&"bind_texture:0:16".to_string()));
    assert!(cmd.commands.contains(&"bind_buffer:1:16".to_string()));
    assert!(cmd.commands.contains(&"bind_index_buffer:U16:0".to_string()));
    assert_eq!(cmd.pushed, vec![1.0f32.to_le_bytes().to_vec()]);
    assert!(!combiner.is_dirty());
}

#[test]
fn test_draw_when_clean_records_nothing() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let a = combiner.add_morph_targets_to_mesh(&block(2)).unwrap().unwrap();
    combiner.morph_weights_update_complete(a).unwrap();

    let mut cmd = MockCommandList::new();
    assert!(combiner.draw(&mut cmd).unwrap());
    let recorded = cmd.commands.len();

    assert!(!combiner.draw(&mut cmd).unwrap());
    assert_eq!(cmd.commands.len(), recorded);
}

#[test]
fn test_force_draw_after_clear_pushes_disabled_flag() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let a = combiner.add_morph_targets_to_mesh(&block(2)).unwrap().unwrap();
    combiner.morph_weights_update_complete(a).unwrap();

    let mut cmd = MockCommandList::new();
    combiner.draw(&mut cmd).unwrap();
    assert!(combiner.force_draw(&mut cmd).unwrap());

    assert_eq!(cmd.count("draw_indexed"), 2);
    assert_eq!(cmd.pushed[1], 0.0f32.to_le_bytes().to_vec());
}

#[test]
fn test_force_draw_on_empty_mesh_issues_nothing() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let mut cmd = MockCommandList::new();

    assert!(!combiner.force_draw(&mut cmd).unwrap());
    assert!(cmd.commands.is_empty());
}

#[test]
fn test_ranges_bound_to_slot_two() {
    let fixture = Fixture::new();
    let mut desc = fixture.desc();
    desc.ranges = vec![Vec4::ONE; 3];
    let mut combiner = MorphTargetCombiner::new(desc).unwrap();
    let a = combiner.add_morph_targets_to_mesh(&block(1)).unwrap().unwrap();
    combiner.morph_weights_update_complete(a).unwrap();

    let mut cmd = MockCommandList::new();
    combiner.draw(&mut cmd).unwrap();
    assert!(cmd.commands.contains(&"bind_buffer:2:48".to_string()));
}

#[test]
fn test_unknown_handle_update_is_rejected() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let a = combiner.add_morph_targets_to_mesh(&block(2)).unwrap().unwrap();
    combiner.remove_morph_target_block(a).unwrap();
    let mut cmd = MockCommandList::new();
    combiner.draw(&mut cmd).unwrap();

    assert!(!combiner.morph_weights_update_complete(a).unwrap());
    assert!(!combiner.is_dirty());
    assert!(combiner.morph_weights_mut(a).is_none());
}

// ============================================================================
// Removing blocks
// ============================================================================

#[test]
fn test_remove_then_add_reuses_layout() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let a = combiner.add_morph_targets_to_mesh(&block(4)).unwrap().unwrap();
    let layout_a = combiner.block_layout(a).unwrap();

    assert!(combiner.remove_morph_target_block(a).unwrap());
    assert!(!combiner.remove_morph_target_block(a).unwrap());

    let b = combiner.add_morph_targets_to_mesh(&block(4)).unwrap().unwrap();
    assert_eq!(combiner.block_layout(b), Some(layout_a));
    assert_eq!(combiner.block_data(b).unwrap().block_index, 0);
    assert_eq!(combiner.quad_count(), 4);
    // Weight ranges are never reused
    assert_eq!(combiner.block_data(b).unwrap().index_in_weights_buffer, 4);
    assert_eq!(combiner.weight_count(), 8);
}

#[test]
fn test_removed_block_contributes_nothing() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let a = combiner.add_morph_targets_to_mesh(&block(2)).unwrap().unwrap();
    let b = combiner.add_morph_targets_to_mesh(&block(2)).unwrap().unwrap();
    combiner.morph_weights_mut(a).unwrap().copy_from_slice(&[1.0, 1.0]);
    combiner.morph_weights_update_complete(a).unwrap();
    combiner.morph_weights_mut(b).unwrap().copy_from_slice(&[0.5, 0.5]);
    combiner.morph_weights_update_complete(b).unwrap();

    combiner.remove_morph_target_block(a).unwrap();

    assert_eq!(fixture.weights_contents(), vec![0.0, 0.0, 0.5, 0.5]);
    for quad in 0..2 {
        assert!(combiner.mesh().quad(quad).unwrap().iter().all(|v| *v == CombinerVertex::zeroed()));
    }
    assert_ne!(combiner.mesh().quad(2).unwrap()[0], CombinerVertex::zeroed());
    assert!(combiner.is_dirty());
}

#[test]
fn test_failed_remove_keeps_block_registered() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let a = combiner.add_morph_targets_to_mesh(&block(3)).unwrap().unwrap();
    let layout = combiner.block_layout(a).unwrap();

    fixture.device.lock().unwrap().last_buffer("morph_weights").unwrap().fail_next_update();
    assert!(combiner.remove_morph_target_block(a).is_err());

    assert_eq!(combiner.block_count(), 1);
    assert_eq!(combiner.block_layout(a), Some(layout));
    assert!(combiner.morph_weights(a).is_some());
    assert!(!combiner.can_fit(MAX_QUADS));

    assert!(combiner.remove_morph_target_block(a).unwrap());
    assert_eq!(combiner.block_count(), 0);
    assert!(combiner.can_fit(MAX_QUADS));
    let b = combiner.add_morph_targets_to_mesh(&block(3)).unwrap().unwrap();
    assert_eq!(combiner.block_data(b).unwrap().block_index, 0);
}

// ============================================================================
// Source texture
// ============================================================================

#[test]
fn test_grown_source_is_bound_on_next_draw() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    let a = combiner.add_morph_targets_to_mesh(&block(2)).unwrap().unwrap();

    {
        let mut device = fixture.device.lock().unwrap();
        assert!(fixture.source.grow(&mut *device, 32).unwrap());
    }
    assert_eq!(combiner.source_texture().info().array_layers, 32);

    combiner.morph_weights_update_complete(a).unwrap();
    let mut cmd = MockCommandList::new();
    combiner.draw(&mut cmd).unwrap();
    assert!(cmd.commands.contains(&"bind_texture:0:32".to_string()));
}

#[test]
fn test_replaced_source_is_bound() {
    let fixture = Fixture::new();
    let combiner = fixture.combiner();

    fixture.source.replace(Arc::new(MockTexture::new(512, 512, 20, "external")));
    assert_eq!(combiner.source_texture().info().array_layers, 20);
}

// ============================================================================
// Teardown
// ============================================================================

#[test]
fn test_destroy_unsubscribes_and_is_idempotent() {
    let fixture = Fixture::new();
    let mut combiner = fixture.combiner();
    combiner.add_morph_targets_to_mesh(&block(2)).unwrap().unwrap();
    assert_eq!(fixture.source.listener_count(), 1);

    combiner.destroy();
    combiner.destroy();

    assert_eq!(fixture.source.listener_count(), 0);
    assert!(combiner.weights_buffer().is_none());
    assert_eq!(combiner.block_count(), 0);
    assert!(!combiner.can_fit(1));
    assert!(combiner.add_morph_targets_to_mesh(&block(1)).is_err());

    let mut cmd = MockCommandList::new();
    assert!(!combiner.force_draw(&mut cmd).unwrap());
}

#[test]
fn test_drop_unsubscribes() {
    let fixture = Fixture::new();
    {
        let _combiner = fixture.combiner();
        assert_eq!(fixture.source.listener_count(), 1);
    }
    assert_eq!(fixture.source.listener_count(), 0);
}
