use pingpong_kernel::BackendError;

/// Run `create` inside out-of-memory and validation error scopes.
///
/// wgpu reports allocation failures asynchronously; the scopes turn them into
/// a `BackendError` at the call site.
pub(crate) fn scoped<T>(
    device: &wgpu::Device,
    label: &str,
    create: impl FnOnce() -> T,
) -> Result<T, BackendError> {
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = create();
    let validation = pollster::block_on(device.pop_error_scope());
    let oom = pollster::block_on(device.pop_error_scope());

    if let Some(err) = oom {
        tracing::error!(label, "allocation failed: {err}");
        return Err(BackendError::OutOfMemory {
            label: label.to_string(),
        });
    }
    if let Some(err) = validation {
        tracing::error!(label, "validation failed: {err}");
        return Err(BackendError::Validation {
            label: label.to_string(),
            message: err.to_string(),
        });
    }
    Ok(value)
}
