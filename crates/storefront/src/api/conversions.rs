//! Conversions from wire DTOs to domain types.

use verdura_core::{BranchId, CartLineId, CurrencyCode, Price, ProductId};

use crate::types::{Branch, BranchProduct, CartItem, DEFAULT_SUBSTITUTION, Product};

use super::types::{BranchDto, BranchProductDto, CartLineDto};

/// Convert a branch DTO. A missing `is_active` flag means active.
pub fn convert_branch(dto: BranchDto) -> Branch {
    Branch {
        id: BranchId::new(dto.id),
        name: dto.name,
        address: dto.address.unwrap_or_default(),
        phone: dto.phone.unwrap_or_default(),
        latitude: dto.latitude,
        longitude: dto.longitude,
        coverage_radius_km: dto.coverage_radius_km,
        is_active: dto.is_active.unwrap_or(true),
    }
}

pub fn convert_branch_product(dto: BranchProductDto) -> BranchProduct {
    BranchProduct {
        product_id: ProductId::new(dto.product_id),
        stock_quantity: dto.stock_quantity,
        reserved_quantity: dto.reserved_quantity,
        branch_price: dto.branch_price,
    }
}

pub fn convert_cart_line(dto: CartLineDto) -> CartItem {
    CartItem {
        product: Product {
            id: ProductId::new(dto.product_id),
            name: dto.product_name,
            price: Price::new(dto.unit_price, CurrencyCode::default()),
            image_url: dto.image_url,
            unit: dto.unit,
        },
        quantity: dto.quantity,
        substitution_preference: dto
            .substitution_preference
            .filter(|preference| !preference.is_empty())
            .unwrap_or_else(|| DEFAULT_SUBSTITUTION.to_string()),
        cart_line_id: dto.id.map(CartLineId::new),
    }
}
