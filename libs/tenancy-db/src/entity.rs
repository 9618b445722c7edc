use sea_orm::EntityTrait;

/// Capability contract for entities that carry an owning-tenant attribute.
///
/// Every entity the guard can operate on declares its columns explicitly
/// here, so tenant-capability is a compile-time property rather than a
/// runtime attribute probe. Global entities (system configuration, lookup
/// tables) return `None` from [`tenant_col`](Self::tenant_col) and are never
/// tenant-filtered.
///
/// # Example
///
/// ```rust,ignore
/// impl TenantOwned for note::Entity {
///     fn tenant_col() -> Option<Self::Column> {
///         Some(note::Column::TenantId)
///     }
///     fn id_col() -> Self::Column {
///         note::Column::Id
///     }
/// }
/// ```
pub trait TenantOwned: EntityTrait {
    /// Column storing the owning tenant, `None` for global entities.
    fn tenant_col() -> Option<Self::Column>;

    /// Primary identifier column.
    fn id_col() -> Self::Column;
}
